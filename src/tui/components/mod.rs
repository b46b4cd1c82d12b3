pub mod help_popup;
pub mod page_tabs;
pub mod panel_pane;
pub mod search_popover;
pub mod status_bar;
