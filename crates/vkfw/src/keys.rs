//! Input vocabulary: logical keys, modifiers, buttons and pointer modes
//!
//! Logical keys are layout independent. Letters, digits and space carry
//! their printable ASCII value; everything else lives at 256 and above. The
//! raw platform keycode travels next to the logical key in key events, and
//! games should bind to the keycode.
//!
//! Backends translate between the two through a [`KeyTable`], which they fill
//! from the active keyboard layout and rebuild when the layout changes.

use std::sync::RwLock;

use bitflags::bitflags;

/// Raw platform keycode
pub type Keycode = i32;

/// Number of logical key slots
pub const MAX_KEYS: usize = 512;

/// Number of platform keycode slots a [`KeyTable`] holds by default
pub const DEFAULT_KEYCODE_RANGE: usize = 256;

macro_rules! logical_keys {
    ($($(#[$doc:meta])* $name:ident = $code:literal),* $(,)?) => {
        /// Layout independent key identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum Key {
            /// The keycode does not correspond to any logical key
            Unknown = -1,
            $($(#[$doc])* $name = $code,)*
        }

        impl Key {
            /// Every known key, `Unknown` excluded
            pub const ALL: &'static [Key] = &[$(Key::$name),*];

            /// Look a key up by its numeric code
            pub const fn from_code(code: i32) -> Key {
                match code {
                    $($code => Key::$name,)*
                    _ => Key::Unknown,
                }
            }
        }
    };
}

logical_keys! {
    /// Space bar
    Space = 32,
    /// 0
    Num0 = 48,
    /// 1
    Num1 = 49,
    /// 2
    Num2 = 50,
    /// 3
    Num3 = 51,
    /// 4
    Num4 = 52,
    /// 5
    Num5 = 53,
    /// 6
    Num6 = 54,
    /// 7
    Num7 = 55,
    /// 8
    Num8 = 56,
    /// 9
    Num9 = 57,
    /// A
    A = 65,
    /// B
    B = 66,
    /// C
    C = 67,
    /// D
    D = 68,
    /// E
    E = 69,
    /// F
    F = 70,
    /// G
    G = 71,
    /// H
    H = 72,
    /// I
    I = 73,
    /// J
    J = 74,
    /// K
    K = 75,
    /// L
    L = 76,
    /// M
    M = 77,
    /// N
    N = 78,
    /// O
    O = 79,
    /// P
    P = 80,
    /// Q
    Q = 81,
    /// R
    R = 82,
    /// S
    S = 83,
    /// T
    T = 84,
    /// U
    U = 85,
    /// V
    V = 86,
    /// W
    W = 87,
    /// X
    X = 88,
    /// Y
    Y = 89,
    /// Z
    Z = 90,
    /// Backspace
    Backspace = 256,
    /// Left control
    LeftCtrl = 257,
    /// Left shift
    LeftShift = 258,
    /// Left alt
    LeftAlt = 259,
    /// Right control
    RightCtrl = 260,
    /// Right shift
    RightShift = 261,
    /// Right alt / AltGr
    RightAlt = 262,
    /// F1
    F1 = 263,
    /// F2
    F2 = 264,
    /// F3
    F3 = 265,
    /// F4
    F4 = 266,
    /// F5
    F5 = 267,
    /// F6
    F6 = 268,
    /// F7
    F7 = 269,
    /// F8
    F8 = 270,
    /// F9
    F9 = 271,
    /// F10
    F10 = 272,
    /// F11
    F11 = 273,
    /// F12
    F12 = 274,
    /// F13
    F13 = 275,
    /// F14
    F14 = 276,
    /// F15
    F15 = 277,
    /// F16
    F16 = 278,
    /// F17
    F17 = 279,
    /// F18
    F18 = 280,
    /// F19
    F19 = 281,
    /// F20
    F20 = 282,
    /// F21
    F21 = 283,
    /// F22
    F22 = 284,
    /// F23
    F23 = 285,
    /// F24
    F24 = 286,
    /// F25
    F25 = 287,
    /// Escape
    Esc = 288,
    /// Delete
    Del = 289,
    /// Insert
    Insert = 290,
    /// Home
    Home = 291,
    /// End
    End = 292,
    /// Page up
    PageUp = 293,
    /// Page down
    PageDown = 294,
    /// Numpad /
    NumpadDivide = 295,
    /// Numpad *
    NumpadMultiply = 296,
    /// Numpad -
    NumpadSubtract = 297,
    /// Numpad +
    NumpadAdd = 298,
    /// Numpad enter
    NumpadEnter = 299,
    /// Numpad 0
    Numpad0 = 300,
    /// Numpad 1
    Numpad1 = 301,
    /// Numpad 2
    Numpad2 = 302,
    /// Numpad 3
    Numpad3 = 303,
    /// Numpad 4
    Numpad4 = 304,
    /// Numpad 5
    Numpad5 = 305,
    /// Numpad 6
    Numpad6 = 306,
    /// Numpad 7
    Numpad7 = 307,
    /// Numpad 8
    Numpad8 = 308,
    /// Numpad 9
    Numpad9 = 309,
    /// Left arrow
    ArrowLeft = 310,
    /// Right arrow
    ArrowRight = 311,
    /// Up arrow
    ArrowUp = 312,
    /// Down arrow
    ArrowDown = 313,
    /// Numpad decimal separator
    NumpadComma = 314,
}

impl Key {
    /// Numeric code of the key, `-1` for `Unknown`
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Whether this is a known key
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Slot of the key in a `MAX_KEYS` sized table
    fn slot(self) -> Option<usize> {
        usize::try_from(self.code()).ok().filter(|&s| s < MAX_KEYS)
    }
}

bitflags! {
    /// Modifier keys active when an input event happened
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        /// Either control key
        const CTRL = 1;
        /// Either shift key
        const SHIFT = 2;
        /// Left alt
        const LEFT_ALT = 4;
        /// Right alt / AltGr
        const RIGHT_ALT = 8;
        /// Caps lock engaged
        const CAPS_LOCK = 16;
        /// Num lock engaged
        const NUM_LOCK = 32;
    }
}

bitflags! {
    /// Pointer behaviour for a window
    ///
    /// The empty set is the normal pointer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PointerMode: u32 {
        /// The cursor is not rendered
        const HIDDEN = 1;
        /// The cursor cannot leave the window
        const CONFINED = 2;
        /// Pointer events keep arriving when the pointer leaves the window
        const GRABBED = 4;
        /// Relative motion events replace absolute pointer motion
        const RELATIVE = 8;
    }
}

/// Mouse button identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button (1)
    Left,
    /// Right mouse button (2)
    Right,
    /// Scroll wheel button (3)
    ScrollWheel,
    /// Additional buttons, numbered from 4
    Other(i32),
}

impl MouseButton {
    /// Numeric button id
    pub const fn id(self) -> i32 {
        match self {
            Self::Left => 1,
            Self::Right => 2,
            Self::ScrollWheel => 3,
            Self::Other(id) => id,
        }
    }

    /// Button from its numeric id
    pub const fn from_id(id: i32) -> Self {
        match id {
            1 => Self::Left,
            2 => Self::Right,
            3 => Self::ScrollWheel,
            other => Self::Other(other),
        }
    }
}

/// Axis of a scroll event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ScrollDirection {
    /// Vertical wheel
    Vertical = 0,
    /// Horizontal wheel or tilt
    Horizontal = 1,
}

/// Keycode to logical key translation supplied by a backend
pub trait KeyTranslator: Send + Sync {
    /// Logical key for a platform keycode, `Key::Unknown` if unmapped
    fn translate_keycode(&self, keycode: Keycode) -> Key;

    /// Preferred platform keycode for a logical key, `None` if no physical
    /// key produces it in the current layout
    fn translate_key(&self, key: Key) -> Option<Keycode>;
}

/// Two-way keycode/key lookup table
///
/// The forward direction maps each keycode to one key. The reverse direction
/// remembers the first keycode seen for a key, so the preferred physical key
/// stays stable when a layout maps a key twice.
#[derive(Debug, Clone)]
pub struct KeyTable {
    keycode_to_key: Vec<Key>,
    key_to_keycode: Vec<Option<Keycode>>,
}

impl KeyTable {
    /// Empty table covering keycodes `0..DEFAULT_KEYCODE_RANGE`
    pub fn new() -> Self {
        Self::with_keycode_range(DEFAULT_KEYCODE_RANGE)
    }

    /// Empty table covering keycodes `0..range`
    pub fn with_keycode_range(range: usize) -> Self {
        Self {
            keycode_to_key: vec![Key::Unknown; range],
            key_to_keycode: vec![None; MAX_KEYS],
        }
    }

    /// Build a table from `(keycode, key)` pairs in layout order
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Keycode, Key)>) -> Self {
        let mut table = Self::new();
        table.rebuild(pairs);
        table
    }

    /// Forget every mapping
    pub fn clear(&mut self) {
        self.keycode_to_key.fill(Key::Unknown);
        self.key_to_keycode.fill(None);
    }

    /// Replace the whole table, e.g. after a layout change
    pub fn rebuild(&mut self, pairs: impl IntoIterator<Item = (Keycode, Key)>) {
        self.clear();
        for (keycode, key) in pairs {
            self.insert(keycode, key);
        }
    }

    /// Map `keycode` to `key`
    ///
    /// Out-of-range keycodes and `Key::Unknown` are ignored. Remapping a
    /// keycode drops the reverse entry of its previous key if that entry
    /// pointed here, so `translate_key` never names a keycode that no longer
    /// produces the key.
    pub fn insert(&mut self, keycode: Keycode, key: Key) {
        let Some(code_slot) = self.keycode_slot(keycode) else {
            return;
        };

        let previous = self.keycode_to_key[code_slot];
        if let Some(prev_slot) = previous.slot() {
            if self.key_to_keycode[prev_slot] == Some(keycode) {
                self.key_to_keycode[prev_slot] = None;
            }
        }

        self.keycode_to_key[code_slot] = key;
        if let Some(key_slot) = key.slot() {
            self.key_to_keycode[key_slot].get_or_insert(keycode);
        }
    }

    /// Logical key for `keycode`
    pub fn keycode_to_key(&self, keycode: Keycode) -> Key {
        self.keycode_slot(keycode)
            .map_or(Key::Unknown, |slot| self.keycode_to_key[slot])
    }

    /// Preferred keycode for `key`
    pub fn key_to_keycode(&self, key: Key) -> Option<Keycode> {
        key.slot().and_then(|slot| self.key_to_keycode[slot])
    }

    /// Number of keycodes with a mapping
    pub fn mapped_keycodes(&self) -> usize {
        self.keycode_to_key.iter().filter(|k| k.is_known()).count()
    }

    fn keycode_slot(&self, keycode: Keycode) -> Option<usize> {
        usize::try_from(keycode)
            .ok()
            .filter(|&slot| slot < self.keycode_to_key.len())
    }
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyTranslator for KeyTable {
    fn translate_keycode(&self, keycode: Keycode) -> Key {
        self.keycode_to_key(keycode)
    }

    fn translate_key(&self, key: Key) -> Option<Keycode> {
        self.key_to_keycode(key)
    }
}

impl KeyTranslator for RwLock<KeyTable> {
    fn translate_keycode(&self, keycode: Keycode) -> Key {
        self.read()
            .map_or(Key::Unknown, |table| table.keycode_to_key(keycode))
    }

    fn translate_key(&self, key: Key) -> Option<Keycode> {
        self.read().ok().and_then(|table| table.key_to_keycode(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_codes_match_ascii() {
        assert_eq!(Key::A.code(), i32::from(b'A'));
        assert_eq!(Key::Num7.code(), i32::from(b'7'));
        assert_eq!(Key::Space.code(), i32::from(b' '));
        assert_eq!(Key::Unknown.code(), -1);
        assert!(Key::ALL.iter().all(|k| k.code() < MAX_KEYS as i32));
    }

    #[test]
    fn test_from_code_roundtrip() {
        for &key in Key::ALL {
            assert_eq!(Key::from_code(key.code()), key);
        }
        assert_eq!(Key::from_code(100), Key::Unknown);
        assert_eq!(Key::from_code(-5), Key::Unknown);
    }

    #[test]
    fn test_out_of_range_is_unknown() {
        let table = KeyTable::from_pairs([(38, Key::A)]);
        assert_eq!(table.keycode_to_key(-1), Key::Unknown);
        assert_eq!(table.keycode_to_key(256), Key::Unknown);
        assert_eq!(table.keycode_to_key(39), Key::Unknown);
        assert_eq!(table.key_to_keycode(Key::Unknown), None);
        assert_eq!(table.key_to_keycode(Key::B), None);
    }

    #[test]
    fn test_first_keycode_wins_in_reverse() {
        let table = KeyTable::from_pairs([(50, Key::LeftShift), (62, Key::LeftShift)]);
        assert_eq!(table.keycode_to_key(50), Key::LeftShift);
        assert_eq!(table.keycode_to_key(62), Key::LeftShift);
        assert_eq!(table.key_to_keycode(Key::LeftShift), Some(50));
    }

    #[test]
    fn test_remap_keeps_roundtrip() {
        let mut table = KeyTable::from_pairs([(24, Key::Q), (38, Key::A)]);
        // layout switch: keycode 24 now produces A
        table.insert(24, Key::A);

        assert_eq!(table.key_to_keycode(Key::Q), None);
        assert_eq!(table.key_to_keycode(Key::A), Some(38));

        for &key in Key::ALL {
            if let Some(code) = table.key_to_keycode(key) {
                assert_eq!(table.keycode_to_key(code), key);
            }
        }
    }

    #[test]
    fn test_rebuild_replaces_layout() {
        let lock = RwLock::new(KeyTable::from_pairs([(24, Key::Q)]));
        assert_eq!(lock.translate_keycode(24), Key::Q);

        lock.write().unwrap().rebuild([(24, Key::A)]);
        assert_eq!(lock.translate_keycode(24), Key::A);
        assert_eq!(lock.translate_key(Key::Q), None);
        assert_eq!(lock.read().unwrap().mapped_keycodes(), 1);
    }

    #[test]
    fn test_mouse_button_ids() {
        assert_eq!(MouseButton::from_id(1), MouseButton::Left);
        assert_eq!(MouseButton::from_id(3), MouseButton::ScrollWheel);
        assert_eq!(MouseButton::from_id(6).id(), 6);
        assert_eq!(MouseButton::Right.id(), 2);
    }
}
