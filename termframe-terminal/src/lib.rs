//! Terminal grid state for the termframe renderer.
//!
//! Provides the screen model the renderer snapshots each frame:
//!
//! - Cells, styles and the 256-color palette
//! - Primary and alternate screens with scrollback and per-row dirty bits
//! - Cursor, selection and terminal modes
//! - Kitty graphics image storage and Unicode placeholder decoding

pub mod cell;
pub mod color;
pub mod kitty;
pub mod screen;
pub mod snapshot;
pub mod terminal;

pub use cell::{Cell, Style, Underline, Wide};
pub use color::{Color, Palette, Rgb};
pub use kitty::{
    ImageStorage, KittyFormat, KittyImage, KittyPlacement, PLACEHOLDER, Placeholder,
    PlacementKey, PlacementLocation,
};
pub use screen::{Cursor, CursorVisualStyle, Point, Row, Screen, ScreenDirty, Selection};
pub use snapshot::{CursorSnapshot, RowSnapshot, ScreenSnapshot};
pub use terminal::{Modes, ScreenKind, Terminal, TerminalDirty};
