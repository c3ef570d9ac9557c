// Copyright (c) 2017 Jason White
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! Job supervision and the build driver loop (spec §4.D): spawns processes
//! for ready edges, multiplexes their output with a single `poll` call, and
//! retires edges as their subcommands finish.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::process::{Child, Command, Stdio};

use log::warn;
use nix::poll::{poll, PollFd, PollFlags};
use os_pipe::{pipe, PipeReader};

use crate::error::{Error, ResultExt};
use crate::graph::{EdgeIndex, Graph};
use crate::scheduler::Scheduler;

/// Build-wide knobs (spec §4.D).
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Maximum number of subcommands to run concurrently.
    pub jobs: usize,
    /// How many edge failures to tolerate before giving up. `None` means
    /// unlimited: keep going regardless of how many edges fail.
    pub max_fail: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            jobs: num_cpus::get().max(1),
            max_fail: Some(1),
        }
    }
}

/// An in-flight subcommand.
struct Job {
    edge: EdgeIndex,
    child: Child,
    /// `None` for a job scheduled on the console pool: its output is
    /// inherited straight through to this process's own stdout/stderr
    /// instead of being captured, so there's nothing to poll (see
    /// DESIGN.md for why samurai's pipe-fd-inheritance completion trick
    /// doesn't translate to safe `std::process::Command`).
    reader: Option<PipeReader>,
    buf: Vec<u8>,
    command: String,
    failed: bool,
}

/// Creates any missing output directories, writes the response file (if
/// any), and spawns the edge's command. On failure after the response file
/// was written, it's removed again; on failure after a successful run it's
/// left in place for debugging (see `edgedone`).
fn jobstart(
    graph: &mut Graph,
    edge: EdgeIndex,
    console_free: bool,
) -> Result<Job, Error> {
    let outputs = graph.edge(edge).outputs.clone();
    for &n in &outputs {
        if graph.node(n).mtime.is_missing() {
            if let Some(parent) = graph.node(n).path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .context("failed to create output directory")?;
                }
            }
        }
    }

    let rspfile = graph.edge(edge).var("rspfile");
    if let Some(ref path) = rspfile {
        let content = graph.edge(edge).var("rspfile_content").unwrap_or_default();
        fs::write(path, content).context("failed to write response file")?;
    }

    match jobstart_inner(graph, edge, console_free) {
        Ok(job) => Ok(job),
        Err(err) => {
            if let Some(ref path) = rspfile {
                let _ = fs::remove_file(path);
            }
            Err(err)
        }
    }
}

fn jobstart_inner(
    graph: &mut Graph,
    edge: EdgeIndex,
    console_free: bool,
) -> Result<Job, Error> {
    let command = graph
        .edge(edge)
        .var("command")
        .ok_or_else(|| Error::NoCommand(graph.edge(edge).rule.name().to_string()))?;

    let is_console = graph
        .edge(edge)
        .pool
        .map_or(false, |p| graph.pool(p).is_console());

    // Echoing is gated on the console being free, exactly like samurai:
    // any job (console or not) gets its command line printed as long as
    // nothing is currently occupying the terminal.
    if console_free {
        println!("{}", command);
    }

    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(&command);
    cmd.stdin(Stdio::null());

    let reader = if is_console {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        None
    } else {
        let (reader, writer) = pipe().context("failed to create pipe")?;
        cmd.stdout(writer.try_clone().context("failed to duplicate pipe")?);
        cmd.stderr(writer);
        Some(reader)
    };

    let child = cmd
        .spawn()
        .with_context(|_| format!("failed to spawn: {}", command))?;

    Ok(Job {
        edge,
        child,
        reader,
        buf: Vec::new(),
        command,
        failed: false,
    })
}

/// Reads one chunk of buffered output from a piped job. Returns `Ok(true)`
/// if the job is still running, `Ok(false)` at EOF.
fn jobwork(job: &mut Job) -> io::Result<bool> {
    let reader = job
        .reader
        .as_mut()
        .expect("jobwork called on a job with no pipe");

    let mut chunk = [0u8; 4096];
    match reader.read(&mut chunk) {
        Ok(0) => Ok(false),
        Ok(n) => {
            job.buf.extend_from_slice(&chunk[..n]);
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

/// Retires a finished job: flushes its buffered output (if the console is
/// free), reports the exit status, and, if it succeeded, marks its outputs
/// clean and unblocks consumers.
fn jobdone(
    graph: &mut Graph,
    scheduler: &mut Scheduler,
    mut job: Job,
    status: io::Result<std::process::ExitStatus>,
    console_free: bool,
) -> bool {
    if !job.buf.is_empty() && console_free {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(&job.buf);
    }

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            match status.code() {
                Some(code) => {
                    warn!("job failed (exit code {}): {}", code, job.command)
                }
                None => {
                    #[cfg(unix)]
                    {
                        use std::os::unix::process::ExitStatusExt;
                        warn!(
                            "job terminated by signal {}: {}",
                            status.signal().unwrap_or(-1),
                            job.command
                        );
                    }
                    #[cfg(not(unix))]
                    warn!("job terminated abnormally: {}", job.command);
                }
            }
            job.failed = true;
        }
        Err(err) => {
            warn!("wait failed: {}: {}", job.command, err);
            job.failed = true;
        }
    }

    if !job.failed {
        edgedone(graph, scheduler, job.edge);
    }

    job.failed
}

/// Moves an edge out of the "running" state: releases its pool slot (if
/// any, promoting the next overflowing edge), marks its outputs clean, and
/// unblocks consumer edges. Mirrors samurai's `edgedone`, including
/// leaving a failed job's response file on disk for inspection.
fn edgedone(graph: &mut Graph, scheduler: &mut Scheduler, edge: EdgeIndex) {
    if let Some(pool) = graph.edge(edge).pool {
        scheduler.complete_pool(graph, pool);
    }

    let outputs = graph.edge(edge).outputs.clone();
    for n in outputs {
        node_done(graph, scheduler, n);
    }

    if let Some(rspfile) = graph.edge(edge).var("rspfile") {
        let _ = fs::remove_file(rspfile);
    }
}

/// Marks `node` clean and unblocks every edge that consumes it.
fn node_done(graph: &mut Graph, scheduler: &mut Scheduler, node: crate::graph::NodeIndex) {
    graph.node_mut(node).dirty = false;
    let consumers = graph.node(node).uses().to_vec();
    for consumer in consumers {
        scheduler.unblock(graph, consumer);
    }
}

/// Runs the build: drains the ready queue, respecting `options.jobs`
/// concurrent subcommands and `options.max_fail` failures, and reports a
/// single aggregate error if anything failed. Mirrors samurai's `build`.
pub fn run(
    graph: &mut Graph,
    scheduler: &mut Scheduler,
    options: &BuildOptions,
) -> Result<(), Error> {
    let capacity = options.jobs.max(1);
    let mut slots: Vec<Option<Job>> = (0..capacity).map(|_| None).collect();

    // A literal translation of samurai's array-based free list: `avail[i]`
    // names the next free slot after `i`, with `-1` as the end-of-list
    // sentinel, and `next` as the head.
    let mut avail: Vec<i64> = (1..=capacity as i64).collect();
    avail[capacity - 1] = -1;
    let mut next: i64 = 0;

    let mut num_jobs = 0usize;
    let mut num_fail = 0usize;

    if scheduler.is_empty() {
        println!("nothing to do");
    }

    while !scheduler.is_empty() || num_jobs > 0 {
        while !scheduler.is_empty()
            && num_jobs < capacity
            && options.max_fail.map_or(true, |max| num_fail < max)
        {
            let edge = scheduler.pop().unwrap();

            if graph.edge(edge).rule.is_phony() {
                edgedone(graph, scheduler, edge);
                continue;
            }

            let console_free = graph.pool(graph.console_pool()).running == 0;

            match jobstart(graph, edge, console_free) {
                Ok(job) => {
                    let slot = next as usize;
                    next = avail[slot];
                    slots[slot] = Some(job);
                    num_jobs += 1;
                }
                Err(err) => {
                    warn!("job failed to start: {}", err);
                    num_fail += 1;
                }
            }
        }

        if num_jobs == 0 {
            break;
        }

        loop {
            // A console job has no pollable fd (see DESIGN.md), so it can't
            // be detected through `pollfds` alone: a default-pool job may
            // well be running alongside it, keeping `pollfds` non-empty for
            // as long as that job takes. Check non-blockingly for it first,
            // every time around this loop, so its completion is never
            // starved by waiting on unrelated jobs.
            let console_slot = slots
                .iter()
                .position(|slot| matches!(slot, Some(job) if job.reader.is_none()));

            if let Some(slot) = console_slot {
                if let Ok(Some(status)) = slots[slot].as_mut().unwrap().child.try_wait() {
                    let job = slots[slot].take().unwrap();
                    // A console job's buffer is always empty (its output
                    // went straight to the inherited terminal), so
                    // console_free has no effect here.
                    if jobdone(graph, scheduler, job, Ok(status), false) {
                        num_fail += 1;
                    }

                    avail[slot] = next;
                    next = slot as i64;
                    num_jobs -= 1;

                    if num_jobs < capacity {
                        break;
                    }
                    continue;
                }
            }

            let mut pollfds = Vec::new();
            let mut slot_of = Vec::new();
            for (i, slot) in slots.iter().enumerate() {
                if let Some(job) = slot {
                    if let Some(reader) = &job.reader {
                        pollfds.push(PollFd::new(
                            reader.as_raw_fd(),
                            PollFlags::POLLIN,
                        ));
                        slot_of.push(i);
                    }
                }
            }

            if pollfds.is_empty() {
                // Nothing pollable is outstanding and the console job (the
                // only kind that isn't) hasn't exited yet. Its depth is
                // always 1, so there's exactly one, and blocking on it
                // directly is correct.
                let slot = console_slot.expect("num_jobs > 0 implies a running slot");

                let job = slots[slot].take().unwrap();
                let status = job.child.wait();
                if jobdone(graph, scheduler, job, status, false) {
                    num_fail += 1;
                }

                avail[slot] = next;
                next = slot as i64;
                num_jobs -= 1;
            } else {
                // Poll with a bounded timeout whenever a console job is
                // also outstanding, so we come back around to check on it
                // instead of blocking indefinitely on unrelated jobs.
                let timeout = if console_slot.is_some() { 50 } else { -1 };
                let n = poll(&mut pollfds, timeout).context("poll failed")?;

                if n > 0 {
                    for (k, pfd) in pollfds.iter().enumerate() {
                        let revents = match pfd.revents() {
                            Some(flags) => flags,
                            None => continue,
                        };
                        if revents.is_empty() {
                            continue;
                        }

                        let i = slot_of[k];
                        let still_running = {
                            let job = slots[i].as_mut().unwrap();
                            match jobwork(job) {
                                Ok(running) => running,
                                Err(err) => {
                                    warn!("read failed: {}", err);
                                    let _ = job.child.kill();
                                    job.failed = true;
                                    false
                                }
                            }
                        };

                        if still_running {
                            continue;
                        }

                        let job = slots[i].take().unwrap();
                        let status = job.child.wait();
                        let console_free =
                            graph.pool(graph.console_pool()).running == 0;
                        if jobdone(graph, scheduler, job, status, console_free) {
                            num_fail += 1;
                        }

                        avail[i] = next;
                        next = i as i64;
                        num_jobs -= 1;
                    }
                }
            }

            if num_jobs < capacity {
                break;
            }
        }
    }

    if num_fail > 0 {
        if let Some(max) = options.max_fail {
            if num_fail < max {
                return Err(Error::CannotMakeProgress);
            }
        }
        if num_fail > 1 {
            return Err(Error::SubcommandsFailed);
        }
        return Err(Error::SubcommandFailed);
    }

    Ok(())
}
