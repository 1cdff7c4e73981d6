use crate::{GpioError, GpioResult};
use std::fmt::{Display, Formatter};

/// Represents the keys on a 4x4 keypad.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeypadKey {
    /// The `1` key.
    Key1,
    /// The `2` key.
    Key2,
    /// The `3` key.
    Key3,
    /// The `4` key.
    Key4,
    /// The `5` key.
    Key5,
    /// The `6` key.
    Key6,
    /// The `7` key.
    Key7,
    /// The `8` key.
    Key8,
    /// The `9` key.
    Key9,
    /// The `0` key.
    Key0,
    /// The `*` key.
    KeyAsterisk,
    /// The `#` key.
    KeyHash,
    /// The `A` key.
    KeyA,
    /// The `B` key.
    KeyB,
    /// The `C` key.
    KeyC,
    /// The `D` key.
    KeyD,
}

impl KeypadKey {
    pub const ALL: [KeypadKey; 16] = {
        use KeypadKey::*;
        [
            Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9, Key0,
            KeyAsterisk, KeyHash, KeyA, KeyB, KeyC, KeyD,
        ]
    };

    /// Converts the [KeypadKey] to its corresponding character.
    pub fn to_char(self) -> char {
        use KeypadKey::*;

        match self {
            Key1 => '1',
            Key2 => '2',
            Key3 => '3',
            Key4 => '4',
            Key5 => '5',
            Key6 => '6',
            Key7 => '7',
            Key8 => '8',
            Key9 => '9',
            Key0 => '0',
            KeyAsterisk => '*',
            KeyHash => '#',
            KeyA => 'A',
            KeyB => 'B',
            KeyC => 'C',
            KeyD => 'D',
        }
    }

    /// Converts a label character to a [KeypadKey]. Letters are case-insensitive.
    pub fn from_char(c: char) -> Option<KeypadKey> {
        let c = c.to_ascii_uppercase();
        Self::ALL.into_iter().find(|key| key.to_char() == c)
    }
}

impl Display for KeypadKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Maps matrix positions (row, column) to keys.
///
/// Always bijective: every key appears at exactly one position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyMap {
    keys: [[KeypadKey; 4]; 4],
}

impl KeyMap {
    /// The usual layout of 4x4 membrane keypads.
    pub const STANDARD: KeyMap = {
        use KeypadKey::*;
        KeyMap {
            keys: [
                [ Key1, Key2, Key3, KeyA, ],
                [ Key4, Key5, Key6, KeyB, ],
                [ Key7, Key8, Key9, KeyC, ],
                [ KeyAsterisk, Key0, KeyHash, KeyD, ],
            ],
        }
    };

    /// Creates a key map from a grid indexed by `[row][column]`.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if a key is missing or repeated.
    pub fn new(keys: [[KeypadKey; 4]; 4]) -> GpioResult<Self> {
        let map = KeyMap { keys };
        if KeypadKey::ALL.iter().all(|&key| map.position_of(key).is_some()) {
            // 16 distinct keys in 16 cells, so none can repeat.
            Ok(map)
        } else {
            Err(GpioError::InvalidArgument)
        }
    }

    /// Parses a key map from four rows of four labels, e.g. `["123A", "456B", "789C", "*0#D"]`.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` on an unknown label, a wrong row length, or a key that is
    ///   missing or repeated.
    pub fn parse<S: AsRef<str>>(rows: &[S]) -> GpioResult<Self> {
        if rows.len() != 4 {
            return Err(GpioError::InvalidArgument);
        }

        let mut keys = Self::STANDARD.keys;
        for (row, labels) in rows.iter().enumerate() {
            let labels = labels.as_ref().chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>();
            if labels.len() != 4 {
                return Err(GpioError::InvalidArgument);
            }
            for (col, &label) in labels.iter().enumerate() {
                keys[row][col] = KeypadKey::from_char(label).ok_or(GpioError::InvalidArgument)?;
            }
        }

        Self::new(keys)
    }

    /// Gets the key at a position tuple (row, column).
    pub fn key_at(&self, pos: (usize, usize)) -> Option<KeypadKey> {
        self.keys.get(pos.0)?.get(pos.1).copied()
    }

    /// Gets the position tuple (row, column) of a key.
    pub fn position_of(&self, key: KeypadKey) -> Option<(usize, usize)> {
        self.keys.iter().enumerate().find_map(|(row, keys)| {
            keys.iter().position(|&k| k == key).map(|col| (row, col))
        })
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::KeypadKey::*;

    #[test]
    fn standard_layout() {
        let map = KeyMap::STANDARD;
        assert_eq!(map.key_at((0, 0)), Some(Key1));
        assert_eq!(map.key_at((2, 1)), Some(Key8));
        assert_eq!(map.key_at((3, 2)), Some(KeyHash));
        assert_eq!(map.key_at((4, 0)), None);
        assert_eq!(map.position_of(KeyD), Some((3, 3)));
    }

    #[test]
    fn standard_layout_is_bijective() {
        for key in KeypadKey::ALL {
            let pos = KeyMap::STANDARD.position_of(key).unwrap();
            assert_eq!(KeyMap::STANDARD.key_at(pos), Some(key));
        }
        assert_eq!(KeyMap::new(KeyMap::STANDARD.keys), Ok(KeyMap::STANDARD));
    }

    #[test]
    fn repeated_key_is_rejected() {
        let mut keys = KeyMap::STANDARD.keys;
        keys[3][3] = KeyA;
        assert_eq!(KeyMap::new(keys), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn parse_rows() {
        let map = KeyMap::parse(&["123a", "456B", "789C", "*0#D"]).unwrap();
        assert_eq!(map, KeyMap::STANDARD);

        let rotated = KeyMap::parse(&["*741", "0852", "#963", "DCBA"]).unwrap();
        assert_eq!(rotated.key_at((0, 0)), Some(KeyAsterisk));
        assert_eq!(rotated.position_of(KeyA), Some((3, 3)));

        assert_eq!(KeyMap::parse(&["123", "456B", "789C", "*0#D"]), Err(GpioError::InvalidArgument));
        assert_eq!(KeyMap::parse(&["12XA", "456B", "789C", "*0#D"]), Err(GpioError::InvalidArgument));
        assert_eq!(KeyMap::parse(&["123A", "456B", "789C"]), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn chars_round_trip_through_labels() {
        assert_eq!(KeypadKey::from_char('#'), Some(KeyHash));
        assert_eq!(KeypadKey::from_char('d'), Some(KeyD));
        assert_eq!(KeypadKey::from_char('E'), None);
        assert_eq!(Key0.to_string(), "0");
    }
}
