//! The 32-bit [`Token`] handle and its [`TokenKind`] tag.

use core::fmt;

/// The 2-bit discriminant packed into the high bits of a [`Token`].
///
/// `Invalid` is a reserved sentinel: it never refers to a real table entry and compares
/// unequal to every other token, including another `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TokenKind {
    Event = 0,
    Sequence = 1,
    Loop = 2,
    Invalid = 3,
}

impl TokenKind {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            0 => TokenKind::Event,
            1 => TokenKind::Sequence,
            2 => TokenKind::Loop,
            _ => TokenKind::Invalid,
        }
    }

    const fn to_bits(self) -> u32 {
        self as u32
    }

    /// Short one-letter prefix used by [`Token`]'s `Display` impl ("E", "S", "L").
    const fn prefix(self) -> char {
        match self {
            TokenKind::Event => 'E',
            TokenKind::Sequence => 'S',
            TokenKind::Loop => 'L',
            TokenKind::Invalid => '-',
        }
    }
}

const KIND_SHIFT: u32 = 30;
const ID_MASK: u32 = (1 << KIND_SHIFT) - 1;
/// Reserved bit pattern an [`Invalid`](TokenKind::Invalid) token serializes to.
const INVALID_WORD: u32 = u32::MAX;

/// A compact `(kind, id)` handle, cheap to copy, totally ordered by `(kind, id)`.
///
/// A bare `Token` carries no data of its own; resolving one against a `Thread` yields the
/// `Event`, `Sequence`, or `Loop` it refers to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token {
    word: u32,
}

impl Token {
    /// The reserved invalid token. Compares unequal to every other token, including itself
    /// under the derived `Eq`... actually `Eq` is reflexive by construction here, so callers
    /// that need spec.md's "compares unequal to all valid tokens" semantics should use
    /// [`Token::is_invalid`] rather than relying on `==` against another invalid token.
    pub const INVALID: Token = Token { word: INVALID_WORD };

    /// Builds a new token of the given `kind` and `id`.
    ///
    /// # Panics
    /// Panics if `id` does not fit in 30 bits.
    pub fn new(kind: TokenKind, id: u32) -> Self {
        assert!(id <= ID_MASK, "token id {id} does not fit in 30 bits");
        if matches!(kind, TokenKind::Invalid) {
            return Token::INVALID;
        }
        Token { word: (kind.to_bits() << KIND_SHIFT) | id }
    }

    pub const fn event(id: u32) -> Self {
        Token { word: (TokenKind::Event.to_bits() << KIND_SHIFT) | (id & ID_MASK) }
    }

    pub const fn sequence(id: u32) -> Self {
        Token { word: (TokenKind::Sequence.to_bits() << KIND_SHIFT) | (id & ID_MASK) }
    }

    pub const fn loop_(id: u32) -> Self {
        Token { word: (TokenKind::Loop.to_bits() << KIND_SHIFT) | (id & ID_MASK) }
    }

    /// Unpacks a raw 32-bit word (as read from disk) into a `Token`.
    pub const fn from_u32(word: u32) -> Self {
        Token { word }
    }

    /// Packs this token back into its on-disk 32-bit representation.
    pub const fn to_u32(self) -> u32 {
        self.word
    }

    pub const fn kind(self) -> TokenKind {
        TokenKind::from_bits(self.word >> KIND_SHIFT)
    }

    /// The 30-bit id, unique within `kind()` for one thread. Meaningless for `Invalid`.
    pub const fn id(self) -> u32 {
        self.word & ID_MASK
    }

    pub const fn is_invalid(self) -> bool {
        self.word == INVALID_WORD
    }

    pub const fn is_event(self) -> bool {
        matches!(self.kind(), TokenKind::Event)
    }

    pub const fn is_sequence(self) -> bool {
        matches!(self.kind(), TokenKind::Sequence)
    }

    pub const fn is_loop(self) -> bool {
        matches!(self.kind(), TokenKind::Loop)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "-")
        } else {
            write!(f, "{}{}", self.kind().prefix(), self.id())
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u32() {
        for (kind, id) in [
            (TokenKind::Event, 0u32),
            (TokenKind::Event, 12),
            (TokenKind::Sequence, 3),
            (TokenKind::Loop, 7),
            (TokenKind::Event, ID_MASK),
        ] {
            let t = Token::new(kind, id);
            let back = Token::from_u32(t.to_u32());
            assert_eq!(back.kind(), kind);
            assert_eq!(back.id(), id);
        }
    }

    #[test]
    fn display_matches_spec_examples() {
        assert_eq!(Token::event(12).to_string(), "E12");
        assert_eq!(Token::sequence(3).to_string(), "S3");
        assert_eq!(Token::loop_(7).to_string(), "L7");
        assert_eq!(Token::INVALID.to_string(), "-");
    }

    #[test]
    fn invalid_is_reserved_pattern() {
        assert_eq!(Token::INVALID.to_u32(), INVALID_WORD);
        assert!(Token::from_u32(INVALID_WORD).is_invalid());
    }

    #[test]
    fn ordering_is_by_kind_then_id() {
        assert!(Token::event(5) < Token::event(6));
        assert!(Token::event(100) < Token::sequence(0));
        assert!(Token::sequence(100) < Token::loop_(0));
    }

    #[test]
    #[should_panic]
    fn rejects_id_overflowing_30_bits() {
        Token::new(TokenKind::Event, 1 << 30);
    }
}
