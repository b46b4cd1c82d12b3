//! Terminal input to actions, and keys to the bytes a program expects.

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use super::action::Action;
use super::session::{Popover, SessionContext};
use crate::terminal::InputModes;

/// Lines moved per mouse wheel notch
pub const WHEEL_LINES: isize = 3;

/// `modes` are those of the focused terminal, which decide how forwarded
/// keys are encoded.
pub fn map_event(event: Event, session: &SessionContext, modes: InputModes) -> Action {
    match event {
        Event::Key(key) => map_key(key, session, modes),
        Event::Mouse(mouse) if !session.popover_open() => map_mouse(mouse),
        Event::Paste(text) => Action::Paste(text),
        Event::Resize(width, height) => Action::Resize(width, height),
        _ => Action::Tick,
    }
}

/// Bound keys win; otherwise the key is typed into the open popover or
/// forwarded to the focused terminal.
pub fn map_key(key: KeyEvent, session: &SessionContext, modes: InputModes) -> Action {
    if key.kind == KeyEventKind::Release {
        return Action::Tick;
    }
    if let Some(action) = session
        .keybindings
        .action_for(session.binding_scope(), &key)
        .and_then(Action::from_name)
    {
        return action;
    }

    match &session.popover {
        Some(Popover::Search(_)) => match key.code {
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                Action::SearchInput(c)
            }
            KeyCode::Backspace => Action::SearchBackspace,
            _ => Action::Tick,
        },
        Some(Popover::Help) => Action::Tick,
        None => encode_key(&key, modes).map_or(Action::Tick, Action::SendInput),
    }
}

fn map_mouse(mouse: MouseEvent) -> Action {
    let (x, y) = (mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => Action::MouseDown(x, y),
        MouseEventKind::Drag(MouseButton::Left) => Action::MouseDrag(x, y),
        MouseEventKind::Up(MouseButton::Left) => Action::MouseUp(x, y),
        MouseEventKind::ScrollUp => Action::MouseScroll(x, y, -WHEEL_LINES),
        MouseEventKind::ScrollDown => Action::MouseScroll(x, y, WHEEL_LINES),
        _ => Action::Tick,
    }
}

/// Like [`key_to_bytes`], but unmodified cursor keys switch to `ESC O X`
/// while the program has application cursor mode on.
pub fn encode_key(key: &KeyEvent, modes: InputModes) -> Option<Vec<u8>> {
    if modes.application_cursor && key.modifiers.is_empty() {
        let letter = match key.code {
            KeyCode::Up => Some(b'A'),
            KeyCode::Down => Some(b'B'),
            KeyCode::Right => Some(b'C'),
            KeyCode::Left => Some(b'D'),
            KeyCode::Home => Some(b'H'),
            KeyCode::End => Some(b'F'),
            _ => None,
        };
        if let Some(letter) = letter {
            return Some(vec![0x1b, b'O', letter]);
        }
    }
    key_to_bytes(key)
}

/// Pasted text, wrapped in `ESC [200~` / `ESC [201~` when the program
/// asked for bracketed paste. An embedded end marker is dropped.
pub fn paste_bytes(text: &str, modes: InputModes) -> Vec<u8> {
    if !modes.bracketed_paste {
        return text.as_bytes().to_vec();
    }
    let body = text.replace(PASTE_END, "");
    let mut bytes = Vec::with_capacity(body.len() + 12);
    bytes.extend_from_slice(PASTE_START.as_bytes());
    bytes.extend_from_slice(body.as_bytes());
    bytes.extend_from_slice(PASTE_END.as_bytes());
    bytes
}

const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";

/// Encode a key press the way an xterm-compatible terminal would.
pub fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    let bytes = match key.code {
        KeyCode::Char(c) if ctrl && c.is_ascii() => {
            let byte = match c.to_ascii_lowercase() {
                ' ' | '@' | '2' => 0x00,
                c @ ('[' | '\\' | ']' | '^' | '_') => (c as u8) & 0x1f,
                c if c.is_ascii_lowercase() => (c as u8) & 0x1f,
                _ => return None,
            };
            if alt {
                vec![0x1b, byte]
            } else {
                vec![byte]
            }
        }
        KeyCode::Char(c) => {
            let mut bytes = if alt { vec![0x1b] } else { Vec::new() };
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            bytes
        }
        KeyCode::Enter => {
            if alt {
                vec![0x1b, b'\r']
            } else {
                vec![b'\r']
            }
        }
        KeyCode::Esc => vec![0x1b],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace => {
            if alt {
                vec![0x1b, 0x7f]
            } else if ctrl {
                vec![0x08]
            } else {
                vec![0x7f]
            }
        }
        KeyCode::Delete => {
            if alt {
                vec![0x1b, b'd']
            } else {
                b"\x1b[3~".to_vec()
            }
        }
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Up => cursor_key(b'A', key.modifiers),
        KeyCode::Down => cursor_key(b'B', key.modifiers),
        KeyCode::Right => cursor_key(b'C', key.modifiers),
        KeyCode::Left => cursor_key(b'D', key.modifiers),
        KeyCode::Home => cursor_key(b'H', key.modifiers),
        KeyCode::End => cursor_key(b'F', key.modifiers),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::F(n) => match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => return None,
        },
        _ => return None,
    };
    Some(bytes)
}

/// `ESC [ X`, or `ESC [ 1 ; m X` when modifiers are held.
fn cursor_key(letter: u8, modifiers: KeyModifiers) -> Vec<u8> {
    let mut param = 1;
    if modifiers.contains(KeyModifiers::SHIFT) {
        param += 1;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        param += 2;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        param += 4;
    }
    if param == 1 {
        vec![0x1b, b'[', letter]
    } else {
        format!("\x1b[1;{}{}", param, letter as char).into_bytes()
    }
}
