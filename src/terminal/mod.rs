//! Per-instance virtual terminal engine.

mod backfill;
mod capability;
mod flow;
mod grid;
mod instance;
mod render;
mod resize;
mod search;
mod selection;
mod state;

pub use backfill::{BackfillRing, LogFilter};
pub use capability::{FlowControlled, Resizable, Searchable, Writable};
pub use flow::{FlowState, Watermarks, DEFAULT_FLUSH_DEBOUNCE};
pub use grid::{CellGrid, InputModes};
pub use instance::{
    ClearOptions, InstanceEvent, InstanceSettings, RenderContext, Spawner, StreamStats,
    TerminalInstance,
};
pub use render::{CellPatch, PanelSurface};
pub use search::{SearchOptions, SearchQuery};
pub use selection::{BufferPoint, Selection};
pub use state::{CloseReason, TerminalState};
