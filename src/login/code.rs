//! Six-digit verification code entry with per-digit focus.

pub const CODE_LENGTH: usize = 6;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeBuffer {
    digits: [Option<char>; CODE_LENGTH],
    focus: usize,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the digit that currently has input focus.
    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn digit(&self, index: usize) -> Option<char> {
        self.digits.get(index).copied().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    /// The assembled code, once every digit is filled.
    pub fn code(&self) -> Option<String> {
        self.digits.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Apply an input event on one digit.
    ///
    /// A single ASCII digit fills the slot and advances focus; an empty value clears the
    /// slot. Anything else is ignored. Returns whether the buffer changed.
    pub fn input(&mut self, index: usize, value: &str) -> bool {
        if index >= CODE_LENGTH {
            return false;
        }

        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (None, _) => {
                self.digits[index] = None;
                self.focus = index;
                true
            }
            (Some(c), None) if c.is_ascii_digit() => {
                self.digits[index] = Some(c);
                self.focus = (index + 1).min(CODE_LENGTH - 1);
                true
            }
            _ => false,
        }
    }

    /// Backspace on a digit. Only moves focus back when the slot is already empty;
    /// deleting a filled digit arrives as an empty [`CodeBuffer::input`].
    pub fn backspace(&mut self, index: usize) {
        if index < CODE_LENGTH && self.digits[index].is_none() {
            self.focus = index.saturating_sub(1);
        }
    }

    /// Fill every digit from pasted text. Accepts exactly six ASCII digits after trimming.
    pub fn paste(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.len() != CODE_LENGTH || !text.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        for (slot, c) in self.digits.iter_mut().zip(text.chars()) {
            *slot = Some(c);
        }
        self.focus = CODE_LENGTH - 1;
        true
    }
}
