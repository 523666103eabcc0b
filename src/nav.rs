//! Operator navigation over the temporal store.
//!
//! [`Session`] owns the store together with the [`ProgramState`] and is the
//! only thing that mutates either. Each transition returns a [`Transition`]
//! telling the event loop whether to redraw or stop.

use tracing::debug;

use crate::seek::{scroll_to_time, seek_variables, seek_variables_except};
use crate::store::{TemporalStore, Timestamp, VariableUpdate};

const NANOS_PER_SEC: f64 = 1e9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Buffer,
    Variables,
}

impl Pane {
    pub fn toggled(self) -> Self {
        match self {
            Pane::Buffer => Pane::Variables,
            Pane::Variables => Pane::Buffer,
        }
    }
}

/// Discrete operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SwitchPane,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Resume,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Redraw,
    Quit,
}

/// Navigational state. In realtime mode the cursor and every variable focus
/// track the newest data; otherwise they are pinned to `timecursor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramState {
    /// First visible buffer line, derived from the selection and viewport.
    pub buffer_offset: usize,
    pub selected_buffer_line: usize,
    pub selected_variable_index: usize,
    pub focused_pane: Pane,
    pub timecursor: Timestamp,
    pub realtime: bool,
    pub start_time: Timestamp,
}

impl ProgramState {
    pub fn new(start_time: Timestamp) -> Self {
        Self {
            buffer_offset: 0,
            selected_buffer_line: 0,
            selected_variable_index: 0,
            focused_pane: Pane::Buffer,
            timecursor: start_time,
            realtime: true,
            start_time,
        }
    }

    /// Seconds between startup and the pinned instant, never negative.
    pub fn timecursor_secs(&self) -> f64 {
        self.timecursor.saturating_sub(self.start_time).max(0) as f64 / NANOS_PER_SEC
    }
}

/// Offset that keeps `line` on the last visible row. The bottom row of the
/// viewport belongs to the status bar.
pub fn follow_offset(line: usize, viewport_height: usize) -> usize {
    (line + 2).saturating_sub(viewport_height)
}

#[derive(Debug, Clone)]
pub struct Session {
    store: TemporalStore,
    state: ProgramState,
    viewport_height: usize,
}

impl Session {
    pub fn new(start_time: Timestamp, viewport_height: usize) -> Self {
        Self { store: TemporalStore::new(), state: ProgramState::new(start_time), viewport_height }
    }

    pub fn store(&self) -> &TemporalStore {
        &self.store
    }

    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    pub fn viewport_height(&self) -> usize {
        self.viewport_height
    }

    /// Appends one ingested line. Frozen sessions store it without moving.
    pub fn record(
        &mut self,
        text: String,
        update: Option<VariableUpdate>,
        timestamp: Timestamp,
    ) -> Transition {
        let live = self.state.realtime;
        let timestamp = self.store.append(text, update, timestamp, live);
        if live {
            self.state.timecursor = timestamp;
            self.follow_tail();
        }
        Transition::Redraw
    }

    pub fn apply(&mut self, action: Action) -> Transition {
        match (action, self.state.focused_pane) {
            (Action::Quit, _) => return Transition::Quit,
            (Action::SwitchPane, pane) => self.state.focused_pane = pane.toggled(),
            (Action::Resume, _) => self.resume(),
            (Action::MoveUp, Pane::Buffer) => self.move_buffer_line(-1),
            (Action::MoveDown, Pane::Buffer) => self.move_buffer_line(1),
            (Action::MoveUp, Pane::Variables) => self.move_variable_selection(-1),
            (Action::MoveDown, Pane::Variables) => self.move_variable_selection(1),
            (Action::MoveLeft, Pane::Variables) => self.step_selected_variable(-1),
            (Action::MoveRight, Pane::Variables) => self.step_selected_variable(1),
            (Action::MoveLeft | Action::MoveRight, Pane::Buffer) => {}
        }
        Transition::Redraw
    }

    /// Adopts a new terminal height.
    pub fn resize(&mut self, viewport_height: usize) -> Transition {
        self.viewport_height = viewport_height;
        self.state.buffer_offset = follow_offset(self.state.selected_buffer_line, viewport_height);
        Transition::Redraw
    }

    fn freeze(&mut self) {
        if self.state.realtime {
            debug!("realtime paused");
        }
        self.state.realtime = false;
    }

    fn follow_tail(&mut self) {
        if let Some(last) = self.store.buffer().last_index() {
            self.select_line(last);
        }
    }

    fn select_line(&mut self, line: usize) {
        self.state.selected_buffer_line = line;
        self.state.buffer_offset = follow_offset(line, self.viewport_height);
    }

    fn move_buffer_line(&mut self, delta: isize) {
        let Some(last) = self.store.buffer().last_index() else {
            return;
        };
        self.freeze();
        let line = self.state.selected_buffer_line.saturating_add_signed(delta).min(last);
        self.select_line(line);
        if let Some(timestamp) = self.store.buffer().timestamp_at(line) {
            self.state.timecursor = timestamp;
        }
        seek_variables(self.store.registry_mut(), self.state.timecursor);
    }

    fn move_variable_selection(&mut self, delta: isize) {
        let Some(last) = self.store.registry().len().checked_sub(1) else {
            return;
        };
        self.state.selected_variable_index =
            self.state.selected_variable_index.saturating_add_signed(delta).min(last);
    }

    fn step_selected_variable(&mut self, delta: isize) {
        let index = self.state.selected_variable_index;
        let Some(history) = self.store.registry_mut().get_index_mut(index) else {
            return;
        };
        let Some(timestamp) = history.step_focus(delta) else {
            return;
        };
        let selected = history.name().to_owned();
        self.freeze();
        self.state.timecursor = timestamp;
        let line = scroll_to_time(self.store.buffer(), timestamp, self.state.selected_buffer_line);
        self.select_line(line);
        seek_variables_except(self.store.registry_mut(), &selected, timestamp);
    }

    fn resume(&mut self) {
        debug!(lines = self.store.buffer().len(), "realtime resumed");
        self.state.realtime = true;
        self.store.registry_mut().focus_latest_all();
        if let Some(timestamp) = self.store.buffer().last_timestamp() {
            self.state.timecursor = timestamp;
        }
        self.follow_tail();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VariableHistory;
    use rstest::rstest;

    fn var(name: &str, value: &str) -> Option<VariableUpdate> {
        Some(VariableUpdate { name: name.to_string(), value: value.to_string() })
    }

    /// Lines at t=100..=500: plain, .x=1, .y=hello, .x=2, plain.
    fn seeded(viewport_height: usize) -> Session {
        let mut session = Session::new(0, viewport_height);
        session.record("boot".to_string(), None, 100);
        session.record(".x=1".to_string(), var("x", "1"), 200);
        session.record(".y=hello".to_string(), var("y", "hello"), 300);
        session.record(".x=2".to_string(), var("x", "2"), 400);
        session.record("done".to_string(), None, 500);
        session
    }

    fn focus_of(session: &Session, name: &str) -> Option<usize> {
        session.store().registry().get(name).map(VariableHistory::focus)
    }

    #[test]
    fn starts_live_on_buffer_pane() {
        let session = Session::new(42, 10);
        assert_eq!(session.state().focused_pane, Pane::Buffer);
        assert!(session.state().realtime);
        assert_eq!(session.state().start_time, 42);
    }

    #[test]
    fn live_ingest_follows_tail() {
        let session = seeded(3);
        let state = session.state();
        assert_eq!(state.selected_buffer_line, 4);
        assert_eq!(state.buffer_offset, 3);
        assert_eq!(state.timecursor, 500);
        assert_eq!(focus_of(&session, "x"), Some(1));
    }

    #[test]
    fn frozen_ingest_keeps_cursor_and_focus() {
        let mut session = seeded(10);
        session.apply(Action::MoveUp);
        session.apply(Action::MoveUp);
        let before = session.state().clone();

        session.record(".x=3".to_string(), var("x", "3"), 600);

        assert_eq!(session.state(), &before);
        assert_eq!(session.store().buffer().len(), 6);
        assert_eq!(focus_of(&session, "x"), Some(0));
    }

    #[test]
    fn switch_pane_only_toggles_pane() {
        let mut session = seeded(10);
        let before = session.state().clone();
        assert_eq!(session.apply(Action::SwitchPane), Transition::Redraw);
        assert_eq!(session.state().focused_pane, Pane::Variables);
        assert_eq!(session.state().realtime, before.realtime);
        assert_eq!(session.state().selected_buffer_line, before.selected_buffer_line);
        session.apply(Action::SwitchPane);
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn buffer_up_freezes_and_seeks_variables() {
        let mut session = seeded(10);
        session.apply(Action::MoveUp);
        session.apply(Action::MoveUp);

        let state = session.state();
        assert!(!state.realtime);
        assert_eq!(state.selected_buffer_line, 2);
        assert_eq!(state.timecursor, 300);
        assert_eq!(focus_of(&session, "x"), Some(0));
        assert_eq!(focus_of(&session, "y"), Some(0));
    }

    #[test]
    fn buffer_up_clamps_at_first_line() {
        let mut session = seeded(10);
        for _ in 0..10 {
            session.apply(Action::MoveUp);
        }
        assert_eq!(session.state().selected_buffer_line, 0);
        assert_eq!(session.state().timecursor, 100);
    }

    #[test]
    fn buffer_down_clamps_at_last_line() {
        let mut session = seeded(10);
        session.apply(Action::MoveDown);
        assert_eq!(session.state().selected_buffer_line, 4);
        assert!(!session.state().realtime);
    }

    #[rstest]
    #[case(3, 0, 0)]
    #[case(3, 2, 1)]
    #[case(3, 4, 3)]
    #[case(10, 4, 0)]
    fn buffer_move_tracks_viewport_bottom(
        #[case] height: usize,
        #[case] target_line: usize,
        #[case] expected_offset: usize,
    ) {
        let mut session = seeded(height);
        for _ in 0..10 {
            session.apply(Action::MoveUp);
        }
        for _ in 0..target_line {
            session.apply(Action::MoveDown);
        }
        assert_eq!(session.state().selected_buffer_line, target_line);
        assert_eq!(session.state().buffer_offset, expected_offset);
    }

    #[test]
    fn buffer_moves_on_empty_session_stay_live() {
        let mut session = Session::new(0, 10);
        session.apply(Action::MoveUp);
        session.apply(Action::MoveDown);
        assert!(session.state().realtime);
        assert_eq!(session.state().selected_buffer_line, 0);
    }

    #[test]
    fn variable_selection_moves_without_touching_time() {
        let mut session = seeded(10);
        session.apply(Action::SwitchPane);
        session.apply(Action::MoveDown);
        session.apply(Action::MoveDown);
        assert_eq!(session.state().selected_variable_index, 1);
        assert!(session.state().realtime);
        assert_eq!(session.state().timecursor, 500);
        session.apply(Action::MoveUp);
        session.apply(Action::MoveUp);
        assert_eq!(session.state().selected_variable_index, 0);
        assert_eq!(focus_of(&session, "x"), Some(1));
    }

    #[test]
    fn variable_left_scrubs_buffer_and_other_variables() {
        let mut session = seeded(10);
        session.apply(Action::SwitchPane);
        session.apply(Action::MoveLeft);

        let state = session.state();
        assert!(!state.realtime);
        assert_eq!(state.timecursor, 200);
        assert_eq!(state.selected_buffer_line, 1);
        assert_eq!(focus_of(&session, "x"), Some(0));
        assert!(!crate::seek::is_active_at(
            session.store().registry().get("y").expect("y"),
            state.timecursor
        ));

        session.apply(Action::MoveRight);
        assert_eq!(session.state().timecursor, 400);
        assert_eq!(session.state().selected_buffer_line, 3);
        assert_eq!(focus_of(&session, "x"), Some(1));
        assert_eq!(focus_of(&session, "y"), Some(0));
    }

    #[test]
    fn variable_left_clamps_at_first_value() {
        let mut session = seeded(10);
        session.apply(Action::SwitchPane);
        for _ in 0..5 {
            session.apply(Action::MoveLeft);
        }
        assert_eq!(focus_of(&session, "x"), Some(0));
        assert_eq!(session.state().selected_buffer_line, 1);
    }

    #[test]
    fn variable_right_at_last_value_is_stable() {
        let mut session = seeded(10);
        session.apply(Action::SwitchPane);
        session.apply(Action::MoveRight);
        assert_eq!(focus_of(&session, "x"), Some(1));
        assert_eq!(session.state().selected_buffer_line, 3);
        assert_eq!(session.state().timecursor, 400);
    }

    #[test]
    fn variable_left_steps_through_tied_values() {
        let mut session = Session::new(0, 10);
        session.record(".x=a".to_string(), var("x", "a"), 100);
        session.record(".x=b".to_string(), var("x", "b"), 100);
        session.apply(Action::SwitchPane);

        session.apply(Action::MoveLeft);
        let x = session.store().registry().get("x").expect("x");
        assert_eq!(x.focus(), 0);
        assert_eq!(x.focused_value(), Some("a"));
        assert_eq!(session.state().timecursor, 100);

        session.apply(Action::MoveRight);
        assert_eq!(focus_of(&session, "x"), Some(1));
    }

    #[test]
    fn frozen_time_before_start_reads_as_zero() {
        let mut state = ProgramState::new(1_000);
        state.timecursor = 500;
        assert!(state.timecursor_secs() >= 0.0);
        assert_eq!(format!("{:.2}", state.timecursor_secs()), "0.00");
    }

    #[test]
    fn left_right_ignored_in_buffer_pane() {
        let mut session = seeded(10);
        let before = session.state().clone();
        session.apply(Action::MoveLeft);
        session.apply(Action::MoveRight);
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn left_right_without_variables_is_noop() {
        let mut session = Session::new(0, 10);
        session.record("plain".to_string(), None, 1);
        session.apply(Action::SwitchPane);
        session.apply(Action::MoveLeft);
        assert!(session.state().realtime);
    }

    #[test]
    fn resume_jumps_everything_to_latest() {
        let mut session = seeded(3);
        session.apply(Action::SwitchPane);
        session.apply(Action::MoveLeft);
        session.record(".x=3".to_string(), var("x", "3"), 600);
        session.record(".y=bye".to_string(), var("y", "bye"), 700);

        session.apply(Action::Resume);

        let state = session.state();
        assert!(state.realtime);
        assert_eq!(state.selected_buffer_line, 6);
        assert_eq!(state.buffer_offset, 5);
        assert_eq!(state.timecursor, 700);
        assert_eq!(state.focused_pane, Pane::Variables);
        assert_eq!(focus_of(&session, "x"), Some(2));
        assert_eq!(focus_of(&session, "y"), Some(1));
    }

    #[test]
    fn quit_leaves_state_alone() {
        let mut session = seeded(10);
        let before = session.state().clone();
        assert_eq!(session.apply(Action::Quit), Transition::Quit);
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn resize_recomputes_offset() {
        let mut session = seeded(10);
        assert_eq!(session.state().buffer_offset, 0);
        session.resize(4);
        assert_eq!(session.viewport_height(), 4);
        assert_eq!(session.state().buffer_offset, 2);
    }

    #[test]
    fn timecursor_secs_is_relative_to_start() {
        let mut state = ProgramState::new(1_000_000_000);
        state.timecursor = 3_500_000_000;
        assert!((state.timecursor_secs() - 2.5).abs() < f64::EPSILON);
    }
}
