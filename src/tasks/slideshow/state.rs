/// Outcome of a navigation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved(usize),
    /// Crossed a boundary with looping enabled.
    Wrapped(usize),
    /// Forward past the last item without looping; the index is unchanged.
    End,
    /// Backward past the first item without looping; the index is unchanged.
    Stay,
}

/// Position within a non-empty collection.
#[derive(Debug, Clone)]
pub struct Cursor {
    index: usize,
    len: usize,
    looping: bool,
}

impl Cursor {
    pub fn new(len: usize, looping: bool) -> Self {
        debug_assert!(len > 0, "cursor over an empty collection");
        Self {
            index: 0,
            len,
            looping,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn next(&mut self) -> Step {
        if self.index + 1 >= self.len {
            if !self.looping {
                return Step::End;
            }
            self.index = 0;
            return Step::Wrapped(0);
        }
        self.index += 1;
        Step::Moved(self.index)
    }

    pub fn prev(&mut self) -> Step {
        if self.index == 0 {
            if !self.looping {
                return Step::Stay;
            }
            self.index = self.len - 1;
            return Step::Wrapped(self.index);
        }
        self.index -= 1;
        Step::Moved(self.index)
    }
}
