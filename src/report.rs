//! Operator-facing console output. The orchestrator only emits [`Event`]s;
//! colouring and line layout live here.

use crate::deploy::{EndpointSource, Event, Step};
use colored::Colorize;
use std::io::{self, Stdout, Write};

pub trait Reporter {
    fn report(&mut self, event: &Event);
    fn fail(&mut self, error: &anyhow::Error);
}

/// Writes one status line per step: a yellow "Doing X... " prefix, then the
/// outcome on the same line.
pub struct ConsoleReporter<W: Write = Stdout> {
    out: W,
    line_open: bool,
}

impl ConsoleReporter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line_open: false,
        }
    }

    fn begin(&mut self, label: &str) {
        self.close();
        // Console write failures are not worth aborting a deployment over.
        let _ = write!(self.out, "{}", format!("{}... ", label).yellow());
        let _ = self.out.flush();
        self.line_open = true;
    }

    fn finish(&mut self, message: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{}", message);
        self.line_open = false;
    }

    fn close(&mut self) {
        if self.line_open {
            let _ = writeln!(self.out);
            self.line_open = false;
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn label(step: Step) -> &'static str {
    match step {
        Step::LoadStackFile => "Checking for stackfile",
        Step::Authenticate => "Getting auth token",
        Step::FindStack => "Getting target stack ID",
        Step::ResolveEndpoint => "Getting endpoint ID",
        Step::ResolveCluster => "Getting Swarm cluster ID",
        Step::CreateStack => "Creating a new stack",
        Step::UpdateStack => "Updating an existing stack",
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: &Event) {
        match event {
            Event::Overrides(env) if env.is_empty() => {
                self.finish("No environment variables for stackfile.")
            }
            Event::Overrides(env) => {
                self.finish("Environment variables for stack file:");
                for var in env {
                    self.finish(format!("  {}: {}", var.name, var.value));
                }
            }
            Event::Started(step) => self.begin(label(*step)),
            Event::StackFileLoaded { bytes } => {
                self.finish(format!("done ({} bytes)", bytes).bright_green())
            }
            Event::Authenticated
            | Event::StackCreated
            | Event::StackUpdated => self.finish("done".bright_green()),
            Event::StackFound { id, endpoint_id } => self.finish(
                format!("Stack found (ID = {}, endpoint {})", id, endpoint_id).bright_green(),
            ),
            Event::StackNotFound => self.finish("stack not found".bright_yellow()),
            Event::EndpointSelected { id, source } => {
                let origin = match source {
                    EndpointSource::ExistingStack => " (from existing stack)",
                    EndpointSource::Explicit => " (explicit)",
                    EndpointSource::Discovered => "",
                };
                self.finish(format!("Using endpoint with ID = {}{}", id, origin).bright_green())
            }
            Event::ClusterResolved { id } => {
                self.finish(format!("using swarm cluster with ID = {}", id).bright_green())
            }
        }
    }

    fn fail(&mut self, error: &anyhow::Error) {
        self.finish(format!("{:#}", error).red());
    }
}
