//! Resolving which cursor to draw.

use termframe_fonts::Sprite;
use termframe_terminal::{CursorSnapshot, CursorVisualStyle};

/// The cursor as drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorStyle {
    Block,
    BlockHollow,
    Bar,
    Underline,
    /// Padlock shown during password input
    Lock,
}

impl CursorStyle {
    /// Solid blocks go under the text so the glyph can be drawn inverted on
    /// top; every other style goes over everything.
    pub fn renders_before_text(self) -> bool {
        matches!(self, CursorStyle::Block)
    }

    pub fn sprite(self) -> Sprite {
        match self {
            CursorStyle::Block => Sprite::CursorRect,
            CursorStyle::BlockHollow => Sprite::CursorHollowRect,
            CursorStyle::Bar => Sprite::CursorBar,
            CursorStyle::Underline => Sprite::CursorUnderline,
            CursorStyle::Lock => Sprite::CursorLock,
        }
    }
}

impl From<CursorVisualStyle> for CursorStyle {
    fn from(style: CursorVisualStyle) -> Self {
        match style {
            CursorVisualStyle::Block => CursorStyle::Block,
            CursorVisualStyle::BlockHollow => CursorStyle::BlockHollow,
            CursorVisualStyle::Bar => CursorStyle::Bar,
            CursorVisualStyle::Underline => CursorStyle::Underline,
        }
    }
}

/// Inputs to [`style`] besides the terminal's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorContext {
    pub focused: bool,
    /// Blink phase; `false` during the hidden half
    pub blink_visible: bool,
    /// Preedit text is shown at the cursor
    pub preedit: bool,
    /// Overrides whether the program asked for a blinking cursor
    pub config_blink: Option<bool>,
}

impl Default for CursorContext {
    fn default() -> Self {
        Self {
            focused: true,
            blink_visible: true,
            preedit: false,
            config_blink: None,
        }
    }
}

/// The cursor style to draw, or `None` when no cursor is visible.
pub fn style(cursor: &CursorSnapshot, ctx: &CursorContext) -> Option<CursorStyle> {
    // Preedit draws its own block over the cursor position
    if ctx.preedit {
        return Some(CursorStyle::Block);
    }
    if !cursor.visible {
        return None;
    }
    cursor.viewport_y?;

    if cursor.password_input {
        return Some(CursorStyle::Lock);
    }
    if !ctx.focused {
        return Some(CursorStyle::BlockHollow);
    }

    let blinking = ctx.config_blink.unwrap_or(cursor.blinking);
    if blinking && !ctx.blink_visible {
        return None;
    }

    Some(cursor.style.into())
}
