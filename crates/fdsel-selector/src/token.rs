use fdsel_transport::Selectable;

/// Key of a handle in a caller-owned arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub usize);

impl From<usize> for Token {
    fn from(index: usize) -> Self {
        Token(index)
    }
}

impl From<Token> for usize {
    fn from(token: Token) -> usize {
        token.0
    }
}

/// A caller-owned collection of handles addressed by [`Token`].
///
/// The selector looks handles up through this trait on every call and never
/// keeps a reference between calls, so the caller is free to add, remove or
/// move handles between polls.
pub trait Handles {
    type Handle: Selectable;

    fn handle(&self, token: Token) -> Option<&Self::Handle>;

    fn handle_mut(&mut self, token: Token) -> Option<&mut Self::Handle>;
}

impl<H: Selectable> Handles for [H] {
    type Handle = H;

    fn handle(&self, token: Token) -> Option<&H> {
        self.get(token.0)
    }

    fn handle_mut(&mut self, token: Token) -> Option<&mut H> {
        self.get_mut(token.0)
    }
}

impl<H: Selectable> Handles for Vec<H> {
    type Handle = H;

    fn handle(&self, token: Token) -> Option<&H> {
        self.get(token.0)
    }

    fn handle_mut(&mut self, token: Token) -> Option<&mut H> {
        self.get_mut(token.0)
    }
}

#[cfg(feature = "slab")]
impl<H: Selectable> Handles for slab::Slab<H> {
    type Handle = H;

    fn handle(&self, token: Token) -> Option<&H> {
        self.get(token.0)
    }

    fn handle_mut(&mut self, token: Token) -> Option<&mut H> {
        self.get_mut(token.0)
    }
}
