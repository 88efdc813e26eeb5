//! 📊 progress.rs: "Are we there yet?" Every migration, every time, forever.
//!
//! 🚀 A migration reports `(percent, sub-task, message)` to a [`TaskProgressSink`].
//! Instead of every caller doing percent arithmetic on a shared sink, a
//! [`Progress`] handle owns a slice of the 0..=100 range and hands out smaller
//! slices with [`Progress::sub_range`] and [`Progress::steps`]. The project
//! migrator thinks it goes from 0 to 100. The draft helper quietly squeezed it
//! into 40..=60. Nobody has to know. 🦆
//!
//! ⚠️  Warning: Watching this progress bar will not make the migration go faster.
//! Neither will refreshing it. We've tried. Science says no.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

/// 📡 Where progress goes. Implementations must tolerate being called from any thread.
pub trait TaskProgressSink: Send + Sync {
    fn make_progress(&self, percent: u64, sub_task: Option<&str>, message: &str);
}

pub type SharedSink = Arc<dyn TaskProgressSink>;

/// 🕳️ Swallows everything. For callers who don't care, and tests that care about other things.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TaskProgressSink for NullSink {
    fn make_progress(&self, _percent: u64, _sub_task: Option<&str>, _message: &str) {}
}

/// 📍 One reported progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u64,
    pub sub_task: Option<String>,
    pub message: String,
}

/// 🎚️ A window onto a parent sink. Local percentages 0..=100 land in
/// `start..=start + len` of the parent, composed in floating point so nested
/// windows don't accumulate rounding drift.
#[derive(Clone)]
pub struct Progress {
    sink: SharedSink,
    start: f64,
    len: f64,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 the sink is a trait object with no Debug; the window is the interesting part
        f.debug_struct("Progress")
            .field("start", &self.start)
            .field("len", &self.len)
            .finish()
    }
}

impl Progress {
    /// 🚀 The full 0..=100 range of `sink`.
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink,
            start: 0.0,
            len: 100.0,
        }
    }

    pub fn null() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// ✂️ A child window covering local `start..=start + len` of this one.
    pub fn sub_range(&self, start: u64, len: u64) -> Progress {
        Progress {
            sink: Arc::clone(&self.sink),
            start: self.start + self.len * (start as f64 / 100.0),
            len: self.len * (len as f64 / 100.0),
        }
    }

    /// 🪜 Split local `start..=start + len` into `total_steps` equal steps.
    pub fn steps(&self, start: u64, len: u64, total_steps: u64) -> StepProgress {
        StepProgress {
            range: self.sub_range(start, len),
            total_steps,
        }
    }

    /// 📣 Report local `percent` (clamped to 100) through to the root sink.
    pub fn report(&self, percent: u64, sub_task: Option<&str>, message: &str) {
        let local = percent.min(100) as f64;
        let absolute = (self.start + self.len * local / 100.0).round() as u64;
        self.sink.make_progress(absolute.min(100), sub_task, message);
    }
}

/// 🪜 Step-counted view: step `n` of `total` maps proportionally into its window.
#[derive(Debug, Clone)]
pub struct StepProgress {
    range: Progress,
    total_steps: u64,
}

impl StepProgress {
    pub fn step(&self, step: u64, sub_task: Option<&str>, message: &str) {
        let percent = if self.total_steps == 0 {
            100
        } else {
            step.min(self.total_steps) * 100 / self.total_steps
        };
        self.range.report(percent, sub_task, message);
    }
}

/// 📼 Remembers every event, optionally forwarding each one down an async channel.
///
/// This is what a task descriptor polls. Also what tests stare at.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
    forward: Option<async_channel::Sender<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📡 Also push every event into `tx`. A closed channel is ignored:
    /// a listener going away must never fail a migration.
    pub fn forwarding_to(tx: async_channel::Sender<ProgressEvent>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            forward: Some(tx),
        }
    }

    pub fn latest(&self) -> Option<ProgressEvent> {
        self.lock().last().cloned()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProgressEvent>> {
        // -- 🔒 a poisoned progress log is still a perfectly readable progress log
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskProgressSink for RecordingSink {
    fn make_progress(&self, percent: u64, sub_task: Option<&str>, message: &str) {
        let event = ProgressEvent {
            percent,
            sub_task: sub_task.map(str::to_string),
            message: message.to_string(),
        };
        if let Some(tx) = &self.forward {
            let _ = tx.try_send(event.clone());
        }
        self.lock().push(event);
    }
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        // -- 🔄 long haul migration. order pizza. plural.
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 🔮 Linear ETA from elapsed time and percent done. `--:--` when we can't guess.
fn format_remaining(elapsed: Duration, percent: u64) -> String {
    if percent == 0 || percent >= 100 {
        return "--:--".to_string();
    }
    // -- assumes the future looks like the past. historically a bad assumption.
    let total_estimated = elapsed.as_secs_f64() / (percent as f64 / 100.0);
    let remaining_secs = total_estimated - elapsed.as_secs_f64();
    if remaining_secs > 0.0 {
        format_duration(Duration::from_secs_f64(remaining_secs))
    } else {
        "--:--".to_string()
    }
}

/// 🎨 indicatif bar with a comfy-table message underneath. The CLI's sink.
///
/// # Ancient Proverb
/// "He who runs a migration without a progress bar, migrates alone and in darkness."
pub struct TerminalProgressSink {
    /// 🏷️ what are we even migrating? a name to display in the UI
    label: String,
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for TerminalProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("TerminalProgressSink")
            .field("label", &self.label)
            .finish()
    }
}

impl TerminalProgressSink {
    pub fn new(label: impl Into<String>) -> Self {
        let progress_bar = ProgressBar::new(100);
        // -- 🐛 the template is a literal; if indicatif rejects it we fall back to the default look
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}] {pos}%") {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        Self {
            label: label.into(),
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// ✅ Mark the bar done. Ring the bell. We made it.
    pub fn finish(&self) {
        self.progress_bar.finish();
    }

    fn render(&self, percent: u64, sub_task: Option<&str>, message: &str) -> String {
        let elapsed = self.start_time.elapsed();

        // 🍽️ two columns, right-aligned, no borders. we're minimalists.
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(sub_task.unwrap_or("-")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{percent}%")).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", format_remaining(elapsed, percent)))
                .set_alignment(CellAlignment::Right),
        ]);

        format!("{}: {}\n{}", self.label, message, table)
    }
}

impl TaskProgressSink for TerminalProgressSink {
    fn make_progress(&self, percent: u64, sub_task: Option<&str>, message: &str) {
        self.progress_bar
            .set_message(self.render(percent, sub_task, message));
        self.progress_bar.set_position(percent.min(100));
    }
}
