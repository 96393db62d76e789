use thiserror::Error;

use crate::job::{Job, JobError, Outcome, Signal, Spec};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("{count} jobs with nonzero exit status")]
    Failed { count: usize },
}

/// Runs jobs and tracks them until they are waited on.
///
/// Not meant for concurrent submission: every method that starts or joins
/// jobs takes `&mut self`.
#[derive(Debug, Default)]
pub struct Executor {
    /// Log every command line at `info` instead of `debug`.
    pub trace: bool,
    /// Keep submitting jobs after a failure.
    pub ignore_errors: bool,
    /// Do not log failed jobs.
    pub no_log_errors: bool,
    jobs: Vec<Job>,
    errors: usize,
    waited: bool,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<I, S>(&mut self, program: &str, args: I) -> Option<&Job>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run_spec(Spec::default(), program, args).await
    }

    /// Run a whitespace-separated command line.
    pub async fn run_line(&mut self, line: &str) -> Option<&Job> {
        self.run_spec_line(Spec::default(), line).await
    }

    /// Run with output echoed live.
    pub async fn emit<I, S>(&mut self, program: &str, args: I) -> Option<&Job>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run_spec(Spec::emit(), program, args).await
    }

    pub async fn emit_line(&mut self, line: &str) -> Option<&Job> {
        self.run_spec_line(Spec::emit(), line).await
    }

    pub async fn run_spec_line(&mut self, spec: Spec, line: &str) -> Option<&Job> {
        let mut words = line.split_whitespace();
        match words.next() {
            Some(program) => {
                let program = program.to_string();
                let args: Vec<&str> = words.collect();
                self.run_spec(spec, &program, args).await
            }
            None => {
                if self.skipping() {
                    return None;
                }
                let mut job = Job::new(String::new(), Vec::new(), spec);
                fail(&mut self.errors, self.no_log_errors, &mut job, JobError::EmptyCommand);
                self.jobs.push(job);
                self.jobs.last()
            }
        }
    }

    /// Start `program`. Foreground jobs are waited for before this returns;
    /// background jobs are left running.
    ///
    /// Returns `None` without starting anything if an earlier job failed and
    /// errors are not ignored.
    pub async fn run_spec<I, S>(&mut self, spec: Spec, program: &str, args: I) -> Option<&Job>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut job = Job::new(program.to_string(), args, spec);
        if self.skipping() {
            tracing::debug!(command = %job.command, errors = self.errors, "skipping job after earlier failure");
            return None;
        }

        if self.trace {
            tracing::info!("{}", job.command);
        } else {
            tracing::debug!(command = %job.command, "run");
        }

        match job.start() {
            Err(e) => fail(&mut self.errors, self.no_log_errors, &mut job, e),
            Ok(running) => {
                job.pid = running.pid;
                if job.spec.background {
                    job.running = Some(running);
                } else {
                    let outcome = running.finish().await;
                    settle(&mut self.errors, self.no_log_errors, &mut job, outcome);
                }
            }
        }

        self.jobs.push(job);
        self.jobs.last()
    }

    /// Wait for every background job not marked `no_wait`. Only the first
    /// call does anything.
    pub async fn wait(&mut self) {
        if self.waited {
            return;
        }
        self.waited = true;

        let Self {
            jobs,
            errors,
            no_log_errors,
            ..
        } = self;
        for job in jobs.iter_mut() {
            if !job.spec.background || job.spec.no_wait {
                continue;
            }
            let Some(running) = job.running.take() else {
                continue;
            };
            let outcome = running.finish().await;
            settle(errors, *no_log_errors, job, outcome);
        }
    }

    /// Send SIGINT to every background job still running.
    pub fn interrupt(&self) {
        self.signal_background(Signal::Interrupt);
    }

    /// Kill every background job still running.
    pub fn kill(&self) {
        self.signal_background(Signal::Kill);
    }

    /// An aggregate error if any counted job failed.
    pub fn err(&self) -> Result<(), ExecError> {
        if self.errors > 0 {
            return Err(ExecError::Failed { count: self.errors });
        }
        Ok(())
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn skipping(&self) -> bool {
        self.errors > 0 && !self.ignore_errors
    }

    fn signal_background(&self, signal: Signal) {
        for job in &self.jobs {
            if !job.spec.background {
                continue;
            }
            if let Some(running) = &job.running {
                tracing::debug!(command = %job.command, ?signal, "signalling job");
                running.signal(signal);
            }
        }
    }
}

/// Record a finished job's output and count it if it failed.
fn settle(errors: &mut usize, no_log_errors: bool, job: &mut Job, outcome: Outcome) {
    job.stdout = outcome.stdout;
    job.stderr = outcome.stderr;
    match outcome.status {
        Ok(status) => {
            job.status = Some(status);
            if !status.success() {
                fail(errors, no_log_errors, job, JobError::Exit(status));
            }
        }
        Err(e) => fail(errors, no_log_errors, job, e),
    }
}

fn fail(errors: &mut usize, no_log_errors: bool, job: &mut Job, err: JobError) {
    if !no_log_errors {
        tracing::warn!(command = %job.command, error = %err, "job failed");
        if !job.stderr.is_empty() {
            tracing::warn!("stderr was: {}", String::from_utf8_lossy(&job.stderr));
        }
    }
    if !job.spec.ignore_errors {
        *errors += 1;
        job.err = Some(err);
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        for job in &self.jobs {
            if let Some(running) = &job.running {
                running.abort();
            }
        }
    }
}
