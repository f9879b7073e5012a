//! Redirections
//!
//! Redirects are applied left to right onto a copy of the caller's
//! [`IoContext`], so `2>&1 >file` and `>file 2>&1` differ the way they do in
//! bash. Only descriptors 0, 1 and 2 are wired; a redirect on a higher
//! descriptor still opens (and creates) its file.

use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Arc;

use super::io::{IoContext, Sink, Source};
use super::Interpreter;
use crate::error::{Error, Result};
use crate::options::ShellOption;
use crate::parser::{Redirect, RedirectKind};

/// bash-style text for an open failure.
fn describe(e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::NotFound => "No such file or directory".to_string(),
        io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        io::ErrorKind::IsADirectory => "Is a directory".to_string(),
        _ => e.to_string(),
    }
}

fn open_failed(target: &str, e: io::Error) -> Error {
    Error::Redirect(format!("{target}: {}", describe(&e)))
}

fn set_output(io: &mut IoContext, fd: i32, sink: Sink) {
    match fd {
        1 => io.stdout = sink,
        2 => io.stderr = sink,
        0 => {}
        _ => tracing::trace!(fd, "redirect on unwired descriptor"),
    }
}

fn set_input(io: &mut IoContext, fd: i32, source: Source) {
    if fd == 0 {
        io.stdin = source;
    } else {
        tracing::trace!(fd, "input redirect on unwired descriptor");
    }
}

/// Strip the leading tabs of every line, for `<<-`.
fn strip_tabs(body: &str) -> String {
    body.split_inclusive('\n')
        .map(|line| line.trim_start_matches('\t'))
        .collect()
}

impl Interpreter {
    /// Apply `redirects` on top of `io`, returning the streams the command
    /// should run with.
    pub(crate) async fn apply_redirects(&mut self, redirects: &[Redirect], io: &IoContext) -> Result<IoContext> {
        let mut io = io.clone();
        for redirect in redirects {
            self.apply_redirect(redirect, &mut io).await?;
        }
        Ok(io)
    }

    async fn apply_redirect(&mut self, redirect: &Redirect, io: &mut IoContext) -> Result<()> {
        let fd = redirect.effective_fd();
        match redirect.kind {
            RedirectKind::HereDoc | RedirectKind::HereDocStrip => {
                let body = self.heredoc_body(redirect, io).await?;
                set_input(io, fd, Source::bytes(body));
            }
            RedirectKind::HereString => {
                let mut text = self.expand_word_string(&redirect.target, io).await?;
                text.push('\n');
                set_input(io, fd, Source::bytes(text));
            }
            RedirectKind::DupOutput | RedirectKind::DupInput => {
                let target = self.expand_word_string(&redirect.target, io).await?;
                self.duplicate(redirect, fd, &target, io)?;
            }
            RedirectKind::Input => {
                let target = self.expand_word_string(&redirect.target, io).await?;
                let source = match target.as_str() {
                    "/dev/stdin" => io.stdin.clone(),
                    "/dev/null" => Source::Null,
                    _ => Source::File(Arc::new(self.open(&target, OpenOptions::new().read(true))?)),
                };
                set_input(io, fd, source);
            }
            RedirectKind::ReadWrite => {
                let target = self.expand_word_string(&redirect.target, io).await?;
                let file = Arc::new(self.open(&target, OpenOptions::new().read(true).write(true).create(true))?);
                if fd == 0 {
                    set_input(io, fd, Source::File(file));
                } else {
                    set_output(io, fd, Sink::File(file));
                }
            }
            RedirectKind::Output | RedirectKind::Clobber | RedirectKind::Append => {
                let target = self.expand_word_string(&redirect.target, io).await?;
                let sink = self.output_sink(&target, redirect.kind, io)?;
                set_output(io, fd, sink);
            }
            RedirectKind::OutputBoth | RedirectKind::AppendBoth => {
                let target = self.expand_word_string(&redirect.target, io).await?;
                let kind = if redirect.kind == RedirectKind::AppendBoth {
                    RedirectKind::Append
                } else {
                    RedirectKind::Output
                };
                let sink = self.output_sink(&target, kind, io)?;
                io.stdout = sink.clone();
                io.stderr = sink;
            }
        }
        tracing::trace!(fd, kind = ?redirect.kind, "redirect applied");
        Ok(())
    }

    fn open(&self, target: &str, options: &OpenOptions) -> Result<File> {
        if target.is_empty() {
            return Err(Error::Redirect("ambiguous redirect".to_string()));
        }
        options.open(self.cwd.join(target)).map_err(|e| open_failed(target, e))
    }

    fn output_sink(&self, target: &str, kind: RedirectKind, io: &IoContext) -> Result<Sink> {
        match target {
            "/dev/null" => return Ok(Sink::Null),
            "/dev/stdout" => return Ok(io.stdout.clone()),
            "/dev/stderr" => return Ok(io.stderr.clone()),
            _ => {}
        }
        let mut options = OpenOptions::new();
        if kind == RedirectKind::Append {
            options.append(true).create(true);
        } else {
            if kind == RedirectKind::Output && self.options.is_set(ShellOption::Noclobber) {
                let path = self.cwd.join(target);
                if std::fs::metadata(&path).is_ok_and(|m| m.is_file()) {
                    return Err(Error::Redirect(format!("{target}: cannot overwrite existing file")));
                }
            }
            options.write(true).create(true).truncate(true);
        }
        Ok(Sink::File(Arc::new(self.open(target, &options)?)))
    }

    /// `N>&M`, `N<&M` and `N>&-`.
    fn duplicate(&self, redirect: &Redirect, fd: i32, target: &str, io: &mut IoContext) -> Result<()> {
        let output = redirect.kind == RedirectKind::DupOutput;
        if target == "-" {
            if output {
                set_output(io, fd, Sink::Null);
            } else {
                set_input(io, fd, Source::Null);
            }
            return Ok(());
        }
        match target.parse::<i32>() {
            Ok(source_fd) if output => {
                let sink = match source_fd {
                    1 => io.stdout.clone(),
                    2 => io.stderr.clone(),
                    _ => return Err(Error::Redirect(format!("{source_fd}: bad file descriptor"))),
                };
                set_output(io, fd, sink);
            }
            Ok(0) => {
                let source = io.stdin.clone();
                set_input(io, fd, source);
            }
            Ok(source_fd) => return Err(Error::Redirect(format!("{source_fd}: bad file descriptor"))),
            // `>&file` with no descriptor: both streams to the file
            Err(_) if output && redirect.fd.is_none() => {
                let sink = self.output_sink(target, RedirectKind::Output, io)?;
                io.stdout = sink.clone();
                io.stderr = sink;
            }
            Err(_) => return Err(Error::Redirect(format!("{target}: ambiguous redirect"))),
        }
        Ok(())
    }

    async fn heredoc_body(&mut self, redirect: &Redirect, io: &IoContext) -> Result<String> {
        let Some(heredoc) = &redirect.heredoc else {
            return Ok(String::new());
        };
        let body = if redirect.kind == RedirectKind::HereDocStrip {
            strip_tabs(&heredoc.body)
        } else {
            heredoc.body.clone()
        };
        if heredoc.quoted {
            Ok(body)
        } else {
            self.expand_text(&body, io).await
        }
    }
}
