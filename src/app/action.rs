use crate::layout::FocusDirection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Navigation
    Focus(FocusDirection),
    ToggleMaximize,
    NextPage,
    PrevPage,
    SwitchPage(usize),

    // Popovers
    OpenSearch,
    OpenHelp,
    ClosePopover,

    // Scrollback
    ScrollPageUp,
    ScrollPageDown,
    ScrollTop,
    ScrollBottom,

    // Panel operations
    Restart,
    ClosePanel,
    Clear,
    ClearAll,
    CopySelection,

    // Search prompt
    SearchInput(char),
    SearchBackspace,
    SearchNext,
    SearchPrevious,
    SearchFirst,
    SearchLast,
    SearchHistory,
    ToggleCaseSensitive,
    ToggleWholeWord,
    ToggleRegex,

    // Focused instance input
    SendInput(Vec<u8>),
    Paste(String),

    // Mouse, in screen coordinates
    MouseDown(u16, u16),
    MouseDrag(u16, u16),
    MouseUp(u16, u16),
    MouseScroll(u16, u16, isize),

    Resize(u16, u16),
    Tick,
    Quit,
}

impl Action {
    /// Action bound to a name in the keybinding file.
    pub fn from_name(name: &str) -> Option<Self> {
        let action = match name {
            "focus_left" => Action::Focus(FocusDirection::Left),
            "focus_right" => Action::Focus(FocusDirection::Right),
            "focus_up" => Action::Focus(FocusDirection::Up),
            "focus_down" => Action::Focus(FocusDirection::Down),
            "toggle_maximize" => Action::ToggleMaximize,
            "next_page" => Action::NextPage,
            "prev_page" => Action::PrevPage,
            "open_search" => Action::OpenSearch,
            "open_help" => Action::OpenHelp,
            "close_popover" => Action::ClosePopover,
            "scroll_page_up" => Action::ScrollPageUp,
            "scroll_page_down" => Action::ScrollPageDown,
            "scroll_top" => Action::ScrollTop,
            "scroll_bottom" => Action::ScrollBottom,
            "restart" => Action::Restart,
            "close_panel" => Action::ClosePanel,
            "clear" => Action::Clear,
            "clear_all" => Action::ClearAll,
            "copy_selection" => Action::CopySelection,
            "search_next" => Action::SearchNext,
            "search_previous" => Action::SearchPrevious,
            "search_first" => Action::SearchFirst,
            "search_last" => Action::SearchLast,
            "search_history" => Action::SearchHistory,
            "toggle_case_sensitive" => Action::ToggleCaseSensitive,
            "toggle_whole_word" => Action::ToggleWholeWord,
            "toggle_regex" => Action::ToggleRegex,
            "quit" => Action::Quit,
            _ => {
                if let Some(page) = name.strip_prefix("page_") {
                    let page: usize = page.parse().ok()?;
                    return page.checked_sub(1).map(Action::SwitchPage);
                }
                return None;
            }
        };
        Some(action)
    }
}
