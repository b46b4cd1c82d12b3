use std::time::Instant;

use anyhow::Result;
use tracing::debug;

use super::action::Action;
use super::input::paste_bytes;
use super::session::Popover;
use super::state::AppState;
use crate::error::StreamError;
use crate::models::TerminalKind;
use crate::terminal::{ClearOptions, Searchable, Writable};
use crate::tui::components::page_tabs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchStep {
    /// Re-run from the top of the viewport as the pattern is typed
    Incremental,
    Next,
    Previous,
    First,
    Last,
}

pub fn process_action(state: &mut AppState, action: Action, now: Instant) -> Result<()> {
    match action {
        Action::Quit => {
            state.session.should_quit = true;
        }
        Action::Tick => {}
        Action::Resize(width, height) => {
            debug!(width, height, "terminal resized");
        }

        // Navigation
        Action::Focus(direction) => {
            if state.layout.focus_direction(direction) {
                state.ensure_focused_started(now);
                state.session.reset_blink(now);
            }
        }
        Action::ToggleMaximize => {
            if let Some(id) = state.layout.focused() {
                state.layout.toggle_maximize(id);
            }
        }
        Action::NextPage => {
            if state.layout.next_page() {
                state.ensure_focused_started(now);
            }
        }
        Action::PrevPage => {
            if state.layout.prev_page() {
                state.ensure_focused_started(now);
            }
        }
        Action::SwitchPage(page) => {
            if state.layout.switch_page(page) {
                state.ensure_focused_started(now);
            }
        }

        // Popovers
        Action::OpenSearch => {
            if state.focused_instance_mut().is_some() {
                state.session.open_search();
            }
        }
        Action::OpenHelp => state.session.open_help(),
        Action::ClosePopover => {
            if let Some(Popover::Search(_)) = state.session.close_popover() {
                if let Some(instance) = state.focused_instance_mut() {
                    instance.clear_search();
                }
            }
        }

        // Scrollback
        Action::ScrollPageUp => with_focused(state, |i| i.scroll_page(true)),
        Action::ScrollPageDown => with_focused(state, |i| i.scroll_page(false)),
        Action::ScrollTop => with_focused(state, |i| i.scroll_to_top()),
        Action::ScrollBottom => with_focused(state, |i| i.scroll_to_bottom()),

        // Panel operations
        Action::Restart => {
            if let Some(id) = state.layout.focused() {
                state.restart_panel(id, now);
            }
        }
        Action::ClosePanel => {
            if let Some(id) = state.layout.focused() {
                state.close_panel(id);
                state.ensure_focused_started(now);
            }
        }
        Action::Clear | Action::ClearAll => {
            let all = action == Action::ClearAll;
            with_focused(state, |instance| {
                let first_line_only = !all && instance.kind() == TerminalKind::ScriptRun;
                instance.clear(ClearOptions {
                    first_line_only,
                    all,
                });
            });
        }
        Action::CopySelection => match state.copy_selection() {
            Ok(chars) => state.session.flash(format!("Copied {} characters", chars), now),
            Err(e) => state.report(format!("Copy failed: {:#}", e), now),
        },

        // Search prompt
        Action::SearchInput(c) => {
            if let Some(prompt) = state.session.search_prompt_mut() {
                prompt.input.push(c);
                search(state, SearchStep::Incremental);
            }
        }
        Action::SearchBackspace => {
            if let Some(prompt) = state.session.search_prompt_mut() {
                prompt.input.pop();
                search(state, SearchStep::Incremental);
            }
        }
        Action::SearchNext => search(state, SearchStep::Next),
        Action::SearchPrevious => search(state, SearchStep::Previous),
        Action::SearchFirst => search(state, SearchStep::First),
        Action::SearchLast => search(state, SearchStep::Last),
        Action::SearchHistory => {
            if state.session.recall_history() {
                search(state, SearchStep::Incremental);
            }
        }
        Action::ToggleCaseSensitive | Action::ToggleWholeWord | Action::ToggleRegex => {
            if let Some(prompt) = state.session.search_prompt_mut() {
                let options = &mut prompt.options;
                match action {
                    Action::ToggleCaseSensitive => options.case_sensitive = !options.case_sensitive,
                    Action::ToggleWholeWord => options.whole_word = !options.whole_word,
                    _ => options.regex = !options.regex,
                }
                search(state, SearchStep::Incremental);
            }
        }

        // Input
        Action::SendInput(bytes) => {
            state.session.reset_blink(now);
            write_focused(state, &bytes);
        }
        Action::Paste(text) => {
            if let Some(prompt) = state.session.search_prompt_mut() {
                prompt.input.extend(text.chars().filter(|c| !c.is_control()));
                search(state, SearchStep::Incremental);
            } else if !state.session.popover_open() {
                state.session.reset_blink(now);
                let bytes = paste_bytes(&text, state.focused_input_modes());
                write_focused(state, &bytes);
            }
        }

        // Mouse
        Action::MouseDown(x, y) => {
            let screen = state.screen();
            if screen.tabs.contains((x, y).into()) {
                if let Some(page) = page_tabs::tab_at(state, x) {
                    if state.layout.switch_page(page) {
                        state.ensure_focused_started(now);
                    }
                }
                return Ok(());
            }
            let Some(id) = state.layout.panel_at(screen.panels, x, y) else {
                return Ok(());
            };
            state.layout.focus_panel(id);
            state.ensure_focused_started(now);
            if let Some((row, col)) = state.cell_at(id, x, y) {
                if let Some(instance) = state.focused_instance_mut() {
                    instance.begin_selection(row, col);
                    state.drag = Some(id);
                }
            }
        }
        Action::MouseDrag(x, y) => {
            if let Some(id) = state.drag {
                if let Some((row, col)) = state.cell_at(id, x, y) {
                    if let Some(instance) = state.layout.panel_mut(id).and_then(|p| p.instance.as_mut()) {
                        instance.extend_selection(row, col);
                    }
                }
            }
        }
        Action::MouseUp(..) => {
            if let Some(id) = state.drag.take() {
                if let Some(instance) = state.layout.panel_mut(id).and_then(|p| p.instance.as_mut()) {
                    // A click without a drag selects nothing
                    if instance.selection().is_some_and(|s| s.anchor == s.focus) {
                        instance.clear_selection();
                    }
                }
            }
        }
        Action::MouseScroll(x, y, lines) => {
            let screen = state.screen();
            if let Some(id) = state.layout.panel_at(screen.panels, x, y) {
                if let Some(instance) = state.layout.panel_mut(id).and_then(|p| p.instance.as_mut()) {
                    instance.scroll_lines(lines);
                }
            }
        }
    }
    Ok(())
}

fn with_focused(state: &mut AppState, f: impl FnOnce(&mut crate::terminal::TerminalInstance)) {
    if let Some(instance) = state.focused_instance_mut() {
        f(instance);
    }
}

fn write_focused(state: &mut AppState, bytes: &[u8]) {
    let Some(instance) = state.focused_instance_mut() else {
        return;
    };
    match instance.write(bytes) {
        Ok(()) => {}
        Err(StreamError::ReadOnly) => debug!(instance = %instance.id(), "input to read-only panel dropped"),
        Err(e) => debug!(instance = %instance.id(), error = %e, "input dropped"),
    }
}

fn search(state: &mut AppState, step: SearchStep) {
    let Some(query) = state.session.search_prompt().map(|p| p.query()) else {
        return;
    };
    if query.pattern.is_empty() {
        with_focused(state, |instance| instance.clear_search());
        if let Some(prompt) = state.session.search_prompt_mut() {
            prompt.matched = None;
        }
        return;
    }
    with_focused(state, |instance| {
        match step {
            SearchStep::Incremental => {
                instance.clear_selection();
                instance.find_next(&query)
            }
            SearchStep::Next => instance.find_next(&query),
            SearchStep::Previous => instance.find_previous(&query),
            SearchStep::First => instance.find_first(&query),
            SearchStep::Last => instance.find_last(&query),
        };
    });
    // The outcome arrives as a SearchResult event on the next drain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::{shells as app, started_app};
    use crate::layout::{FocusDirection, PanelId};
    use crate::models::InstanceConfig;
    use crate::pty::mock::MockProvider;
    use crate::pty::StreamEvent;
    use crate::terminal::DEFAULT_FLUSH_DEBOUNCE;
    use std::rc::Rc;

    fn app_with(panels: usize, provider: Rc<MockProvider>) -> (AppState, Instant) {
        started_app(vec![InstanceConfig::shell(); panels], provider)
    }

    fn show(state: &mut AppState, text: &[u8], now: Instant) -> Instant {
        let id = state.focused_instance_mut().unwrap().id();
        state.handle_stream_event(StreamEvent::Data(id, text.to_vec()), now);
        let later = now + DEFAULT_FLUSH_DEBOUNCE;
        state.tick(later);
        state.after_draw();
        later
    }

    #[test]
    fn quit_and_navigation() {
        let (mut state, now) = app(2);
        process_action(&mut state, Action::Focus(FocusDirection::Right), now).unwrap();
        assert_eq!(state.layout.focused(), Some(PanelId(1)));

        process_action(&mut state, Action::Quit, now).unwrap();
        assert!(state.session.should_quit);
    }

    #[test]
    fn pages_switch_and_wrap() {
        let (mut state, now) = app(5);
        process_action(&mut state, Action::NextPage, now).unwrap();
        assert_eq!(state.layout.current_page(), 1);
        process_action(&mut state, Action::NextPage, now).unwrap();
        assert_eq!(state.layout.current_page(), 0);
        process_action(&mut state, Action::SwitchPage(1), now).unwrap();
        assert_eq!(state.layout.focused(), Some(PanelId(4)));
        process_action(&mut state, Action::SwitchPage(7), now).unwrap();
        assert_eq!(state.layout.current_page(), 1);
    }

    #[test]
    fn maximize_toggles_on_the_focused_panel() {
        let (mut state, now) = app(3);
        process_action(&mut state, Action::ToggleMaximize, now).unwrap();
        assert_eq!(state.layout.maximized_on(0), Some(PanelId(0)));
        assert!(!state.layout.panel(PanelId(1)).unwrap().is_visible());
        process_action(&mut state, Action::ToggleMaximize, now).unwrap();
        assert_eq!(state.layout.maximized_on(0), None);
        assert!(state.layout.panel(PanelId(1)).unwrap().is_visible());
    }

    #[test]
    fn typed_search_selects_the_match() {
        let (mut state, now) = app(1);
        let now = show(&mut state, b"alpha\r\nbeta\r\ngamma", now);

        process_action(&mut state, Action::OpenSearch, now).unwrap();
        for c in "beta".chars() {
            process_action(&mut state, Action::SearchInput(c), now).unwrap();
        }
        state.drain_instance_events(now);
        assert_eq!(state.session.search_prompt().unwrap().matched, Some(true));
        let selection = state.focused_instance_mut().unwrap().selection().unwrap();
        assert_eq!((selection.start().row, selection.start().col), (1, 0));

        process_action(&mut state, Action::SearchInput('x'), now).unwrap();
        state.drain_instance_events(now);
        assert_eq!(state.session.search_prompt().unwrap().matched, Some(false));

        process_action(&mut state, Action::ClosePopover, now).unwrap();
        assert!(state.focused_instance_mut().unwrap().selection().is_none());
        assert_eq!(state.session.search_history().next(), Some("betax"));
    }

    #[test]
    fn empty_pattern_clears_the_search() {
        let (mut state, now) = app(1);
        let now = show(&mut state, b"needle", now);
        process_action(&mut state, Action::OpenSearch, now).unwrap();
        process_action(&mut state, Action::SearchInput('n'), now).unwrap();
        process_action(&mut state, Action::SearchBackspace, now).unwrap();

        assert_eq!(state.session.search_prompt().unwrap().matched, None);
        assert!(state.focused_instance_mut().unwrap().selection().is_none());
    }

    #[test]
    fn mouse_drag_selects_inside_the_clicked_panel() {
        let (mut state, now) = app(2);
        // Panel 1 occupies the right half; content starts one cell in
        process_action(&mut state, Action::MouseDown(51, 2), now).unwrap();
        assert_eq!(state.layout.focused(), Some(PanelId(1)));
        process_action(&mut state, Action::MouseUp(51, 2), now).unwrap();
        assert!(state.focused_instance_mut().unwrap().selection().is_none());

        process_action(&mut state, Action::MouseDown(51, 2), now).unwrap();
        process_action(&mut state, Action::MouseDrag(60, 3), now).unwrap();
        process_action(&mut state, Action::MouseUp(60, 3), now).unwrap();
        let selection = state.focused_instance_mut().unwrap().selection().unwrap();
        assert_eq!((selection.end().row, selection.end().col), (1, 9));
        assert_eq!(state.drag, None);
    }

    #[test]
    fn clicking_a_tab_switches_page() {
        let (mut state, now) = app(5);
        let x = (0..100).find(|x| page_tabs::tab_at(&state, *x) == Some(1)).unwrap();
        process_action(&mut state, Action::MouseDown(x, 0), now).unwrap();
        assert_eq!(state.layout.current_page(), 1);
    }

    #[test]
    fn close_panel_refocuses_and_quits_when_empty() {
        let (mut state, now) = app(1);
        process_action(&mut state, Action::ClosePanel, now).unwrap();
        assert!(state.layout.is_empty());
        assert!(state.session.should_quit);
    }

    #[test]
    fn input_goes_to_the_focused_instance_only() {
        let provider = Rc::new(MockProvider::default());
        let (mut state, now) = app_with(2, provider.clone());
        process_action(&mut state, Action::Focus(FocusDirection::Right), now).unwrap();
        process_action(&mut state, Action::SendInput(b"ls\r".to_vec()), now).unwrap();
        process_action(&mut state, Action::Paste("echo hi".into()), now).unwrap();

        assert!(provider.recorder(0).written().is_empty());
        assert_eq!(provider.recorder(1).written(), b"ls\recho hi");
    }

    #[test]
    fn paste_is_bracketed_when_the_program_asks() {
        let provider = Rc::new(MockProvider::default());
        let (mut state, now) = app_with(1, provider.clone());
        let now = show(&mut state, b"\x1b[?2004h$ ", now);
        process_action(&mut state, Action::Paste("make test".into()), now).unwrap();
        assert_eq!(provider.recorder(0).written(), b"\x1b[200~make test\x1b[201~");
    }

    #[test]
    fn typing_while_help_is_open_is_dropped() {
        let provider = Rc::new(MockProvider::default());
        let (mut state, now) = app_with(1, provider.clone());
        process_action(&mut state, Action::OpenHelp, now).unwrap();
        process_action(&mut state, Action::Paste("rm -rf".into()), now).unwrap();
        assert!(provider.recorder(0).written().is_empty());
    }
}
