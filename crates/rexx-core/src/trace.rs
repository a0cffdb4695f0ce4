//! TRACE option state machine and clause-prefix formatting (`spec.md` §4.6).
//!
//! The output sink is a small trait with two implementations, the same
//! split `crates/monty/src/print_writer.rs`'s `PrintWriter` trait uses
//! for capturing interpreter output in tests
//! (`NoPrint`/`CollectStringPrint`): a
//! [`NullSink`] for hosts that don't want TRACE output at all, and a
//! [`CollectingSink`] used by this crate's own integration tests.

use std::fmt;

use crate::value::Value;

/// The nine TRACE options Rexx recognizes via `TRACE letter` (`spec.md`
/// §4.6). `Off` and `Normal` are the only two that do not echo clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOption {
    All,
    Commands,
    Errors,
    Failures,
    Intermediates,
    Labels,
    Normal,
    Off,
    Results,
}

impl TraceOption {
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::All => 'A',
            Self::Commands => 'C',
            Self::Errors => 'E',
            Self::Failures => 'F',
            Self::Intermediates => 'I',
            Self::Labels => 'L',
            Self::Normal => 'N',
            Self::Off => 'O',
            Self::Results => 'R',
        }
    }
}

/// `TRACE letter` plus the optional `?` interactive-debug toggle
/// (`spec.md` §4.6: "a leading `?` flips the interactive-debug bit
/// without changing the option").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSetting {
    pub option: TraceOption,
    pub debug: bool,
}

impl TraceSetting {
    #[must_use]
    pub const fn new(option: TraceOption) -> Self {
        Self { option, debug: false }
    }

    #[must_use]
    pub const fn toggled_debug(self) -> Self {
        Self { debug: !self.debug, ..self }
    }

    #[must_use]
    pub fn is_silent(self) -> bool {
        matches!(self.option, TraceOption::Off | TraceOption::Normal)
    }
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self::new(TraceOption::Normal)
    }
}

/// What kind of event is being traced, selecting a 3-character prefix
/// (`spec.md` §4.6 "3-char prefix table").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Clause,
    Command,
    Label,
    Result,
    Intermediate,
    Error,
}

impl TraceEvent {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Clause => "*-*",
            Self::Command => "*>*",
            Self::Label => "*.*",
            Self::Result => ">>>",
            Self::Intermediate => "+++",
            Self::Error => "!!!",
        }
    }
}

/// Where formatted trace lines go.
pub trait TraceSink {
    fn write_line(&mut self, line: &str);
}

/// Discards everything. Default sink for a host that has not enabled
/// TRACE.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn write_line(&mut self, _line: &str) {}
}

/// Collects every line in order, for assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub lines: Vec<String>,
}

impl TraceSink for CollectingSink {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

/// Formats and emits TRACE lines, tracking the current indent level
/// (nested DO blocks push/pop it, `spec.md` §3 DoBlock.indent /
/// Activation TRACE) and the current setting.
#[derive(Debug, Clone, Default)]
pub struct TraceFormatter {
    pub setting: TraceSetting,
    indent: u32,
}

impl TraceFormatter {
    #[must_use]
    pub fn new(setting: TraceSetting) -> Self {
        Self { setting, indent: 0 }
    }

    #[must_use]
    pub fn indent(&self) -> u32 {
        self.indent
    }

    pub fn set_indent(&mut self, indent: u32) {
        self.indent = indent;
    }

    pub fn push_indent(&mut self) {
        self.indent += 1;
    }

    pub fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Whether `event` should be echoed under the current setting
    /// (`spec.md` §4.6's option -> event-kind table).
    #[must_use]
    pub fn should_emit(&self, event: TraceEvent) -> bool {
        match self.setting.option {
            TraceOption::Off => false,
            TraceOption::All => true,
            TraceOption::Normal => matches!(event, TraceEvent::Error),
            TraceOption::Commands => matches!(event, TraceEvent::Command | TraceEvent::Error),
            TraceOption::Labels => matches!(event, TraceEvent::Label | TraceEvent::Error),
            TraceOption::Results => matches!(event, TraceEvent::Clause | TraceEvent::Result | TraceEvent::Error),
            TraceOption::Intermediates => !matches!(event, TraceEvent::Label),
            TraceOption::Errors => matches!(event, TraceEvent::Error),
            TraceOption::Failures => matches!(event, TraceEvent::Error),
        }
    }

    /// Emits one source line, e.g. `*-* say "hi"`.
    pub fn trace_clause(&self, sink: &mut dyn TraceSink, line: u32, source: &str) {
        if !self.should_emit(TraceEvent::Clause) {
            return;
        }
        self.emit(sink, TraceEvent::Clause, line, source);
    }

    /// Emits a computed value, double-quoted per `spec.md` §4.6.
    pub fn trace_value(&self, sink: &mut dyn TraceSink, event: TraceEvent, line: u32, value: &Value) {
        if !self.should_emit(event) {
            return;
        }
        self.emit(sink, event, line, &value.trace_repr());
    }

    fn emit(&self, sink: &mut dyn TraceSink, event: TraceEvent, line: u32, body: &str) {
        let pad = "  ".repeat(self.indent as usize);
        sink.write_line(&format!("{line:>6} {}{pad}{body}", event.prefix()));
    }
}

impl fmt::Display for TraceSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.debug {
            write!(f, "?{}", self.option.letter())
        } else {
            write!(f, "{}", self.option.letter())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_option_emits_clause_and_result_only() {
        let fmt = TraceFormatter::new(TraceSetting::new(TraceOption::Results));
        assert!(fmt.should_emit(TraceEvent::Clause));
        assert!(fmt.should_emit(TraceEvent::Result));
        assert!(!fmt.should_emit(TraceEvent::Intermediate));
    }

    #[test]
    fn normal_only_emits_errors() {
        let fmt = TraceFormatter::new(TraceSetting::default());
        assert!(!fmt.should_emit(TraceEvent::Clause));
        assert!(fmt.should_emit(TraceEvent::Error));
    }

    #[test]
    fn debug_flag_round_trips_through_display() {
        let setting = TraceSetting::new(TraceOption::Results).toggled_debug();
        assert_eq!(setting.to_string(), "?R");
    }

    #[test]
    fn indent_widens_emitted_lines() {
        let mut fmt = TraceFormatter::new(TraceSetting::new(TraceOption::All));
        let mut sink = CollectingSink::default();
        fmt.trace_clause(&mut sink, 1, "say 1");
        fmt.push_indent();
        fmt.trace_clause(&mut sink, 2, "say 2");
        assert!(sink.lines[1].len() > sink.lines[0].len());
    }
}
