// src/handle/bar.rs

//! Progress-bar rendering on top of the generic callback API.
//!
//! Rendering stays behind the [`ProgressRender`] trait so the handle never
//! couples to a concrete bar library; [`IndicatifRender`] is the
//! implementation the CLI uses.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::progress::{ProgressSnapshot, TaskState};

/// A renderer receiving every observed snapshot plus one final call.
///
/// `render` runs on each progress callback while the task is live;
/// `finish` runs exactly once with the terminal snapshot.
pub trait ProgressRender: Send {
    fn render(&mut self, snap: &ProgressSnapshot);
    fn finish(&mut self, snap: &ProgressSnapshot);
}

/// When a lazily registered bar actually materialises.
///
/// `Now` builds the renderer at registration time; the other triggers
/// defer construction until a snapshot with the matching state arrives,
/// so e.g. a `Cancelled`-triggered bar never shows up for a task that
/// completes normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarTrigger {
    Now,
    Running,
    Cancelled,
}

pub(crate) type RenderFactory = Box<dyn FnOnce() -> Box<dyn ProgressRender> + Send>;

/// Bridges the `(old, new)` callback stream onto a [`ProgressRender`],
/// constructing it on first trigger and finishing it exactly once.
pub(crate) struct BarAdapter {
    factory: Option<RenderFactory>,
    render: Option<Box<dyn ProgressRender>>,
    triggers: Vec<BarTrigger>,
    finished: bool,
}

impl BarAdapter {
    pub(crate) fn new(factory: RenderFactory, triggers: Vec<BarTrigger>) -> Self {
        let mut adapter = Self {
            factory: Some(factory),
            render: None,
            triggers,
            finished: false,
        };
        if adapter.triggers.contains(&BarTrigger::Now) {
            adapter.build();
        }
        adapter
    }

    pub(crate) fn observe(&mut self, new: &ProgressSnapshot) {
        if self.render.is_none() && self.matches_trigger(new.state) {
            self.build();
        }
        let Some(render) = self.render.as_mut() else {
            return;
        };
        if new.state.is_terminal() {
            if !self.finished {
                self.finished = true;
                render.finish(new);
            }
        } else {
            render.render(new);
        }
    }

    fn matches_trigger(&self, state: TaskState) -> bool {
        match state {
            TaskState::Running => self.triggers.contains(&BarTrigger::Running),
            TaskState::Cancelled => self.triggers.contains(&BarTrigger::Cancelled),
            _ => false,
        }
    }

    fn build(&mut self) {
        if let Some(factory) = self.factory.take() {
            self.render = Some(factory());
        }
    }
}

/// Terminal progress bar backed by `indicatif`.
///
/// Starts as a spinner while the total is unknown and switches to a
/// bounded bar the first time a snapshot carries a non-zero total.
pub struct IndicatifRender {
    bar: ProgressBar,
    sized: bool,
}

impl IndicatifRender {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, sized: false }
    }
}

impl Default for IndicatifRender {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRender for IndicatifRender {
    fn render(&mut self, snap: &ProgressSnapshot) {
        if !self.sized && snap.total > 0.0 {
            self.bar.set_length(snap.total as u64);
            self.bar.set_style(bar_style());
            self.sized = true;
        }
        self.bar.set_position(snap.amount as u64);
        self.bar.set_message(snap.state.as_str());
    }

    fn finish(&mut self, snap: &ProgressSnapshot) {
        self.render(snap);
        match snap.state {
            TaskState::Done => self.bar.finish_with_message(snap.state.as_str()),
            TaskState::Cancelled | TaskState::Error => {
                self.bar.abandon_with_message(snap.state.as_str())
            }
            _ => self.bar.finish(),
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg:>9} {pos} units")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:>9} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
