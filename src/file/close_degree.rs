//! # Close-Degree Policy
//!
//! The close degree decides what happens to a physical file, and to the
//! objects still open in it, when its last logical file handle is closed.
//! It is chosen when the physical file is first opened and every later open
//! of the same file must request the same degree.
//!
//! | Degree | Last logical close with N open objects                  |
//! |--------|---------------------------------------------------------|
//! | Strong | close all N objects, then release the file              |
//! | Weak   | objects stay usable; release when the last one closes   |
//! | Semi   | N > 0 fails with `ObjectsStillOpen`, nothing changes    |
//! | any    | N == 0 releases the file                                |
//!
//! `Default` is not a behaviour of its own: it resolves to the registry's
//! configured library default when the file is opened.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseDegree {
    #[default]
    Default,
    Weak,
    Semi,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveDegree {
    Weak,
    Semi,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Release,
    CloseObjectsThenRelease,
    Defer,
    Refuse,
}

impl CloseDegree {
    pub fn resolve(self, library_default: EffectiveDegree) -> EffectiveDegree {
        match self {
            CloseDegree::Default => library_default,
            CloseDegree::Weak => EffectiveDegree::Weak,
            CloseDegree::Semi => EffectiveDegree::Semi,
            CloseDegree::Strong => EffectiveDegree::Strong,
        }
    }
}

impl From<EffectiveDegree> for CloseDegree {
    fn from(d: EffectiveDegree) -> Self {
        match d {
            EffectiveDegree::Weak => CloseDegree::Weak,
            EffectiveDegree::Semi => CloseDegree::Semi,
            EffectiveDegree::Strong => CloseDegree::Strong,
        }
    }
}

impl EffectiveDegree {
    pub fn on_last_close(self, open_objects: usize) -> CloseAction {
        match (self, open_objects) {
            (_, 0) => CloseAction::Release,
            (EffectiveDegree::Strong, _) => CloseAction::CloseObjectsThenRelease,
            (EffectiveDegree::Weak, _) => CloseAction::Defer,
            (EffectiveDegree::Semi, _) => CloseAction::Refuse,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EffectiveDegree::Weak => "weak",
            EffectiveDegree::Semi => "semi",
            EffectiveDegree::Strong => "strong",
        }
    }
}

impl fmt::Display for EffectiveDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
