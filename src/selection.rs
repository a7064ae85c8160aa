//! The single selection shared by the dashboard tables.
//!
//! Users, programs and functions are all selectable, but only one of
//! them at a time: any `select` replaces whatever was selected before,
//! in whichever table. Re-renders look the selection up by identity key
//! (the row's name), never by row position.

use serde_json::json;

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    User,
    Program,
    Function,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::User => "user",
            SelectionKind::Program => "program",
            SelectionKind::Function => "function",
        }
    }
}

/// A program or function the user may execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Selection {
    #[default]
    None,
    User(String),
    Program(Target),
    Function(Target),
}

impl Selection {
    pub fn kind(&self) -> Option<SelectionKind> {
        match self {
            Selection::None => None,
            Selection::User(_) => Some(SelectionKind::User),
            Selection::Program(_) => Some(SelectionKind::Program),
            Selection::Function(_) => Some(SelectionKind::Function),
        }
    }

    /// Identity key of the selected row, if it belongs to `kind`'s table.
    pub fn key_for(&self, kind: SelectionKind) -> Option<&str> {
        match (self, kind) {
            (Selection::User(name), SelectionKind::User) => Some(name),
            (Selection::Program(t), SelectionKind::Program) => Some(&t.name),
            (Selection::Function(t), SelectionKind::Function) => Some(&t.name),
            _ => None,
        }
    }

    /// The executable target, when a program or function is selected.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Selection::Program(t) | Selection::Function(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_program(&self) -> bool {
        matches!(self, Selection::Program(_))
    }
}

#[derive(Debug, Default)]
pub struct SelectionStore {
    current: Selection,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `cost` is ignored for user rows.
    pub fn select(&mut self, kind: SelectionKind, key: &str, cost: f64) {
        let next = match kind {
            SelectionKind::User => Selection::User(key.to_string()),
            SelectionKind::Program => Selection::Program(Target { name: key.to_string(), cost }),
            SelectionKind::Function => Selection::Function(Target { name: key.to_string(), cost }),
        };
        log(
            Level::Debug,
            Domain::Selection,
            "select",
            obj(&[
                ("kind", v_str(kind.as_str())),
                ("key", v_str(key)),
                ("replaced", json!(self.current.kind().map(|k| k.as_str()))),
            ]),
        );
        self.current = next;
    }

    pub fn clear(&mut self) {
        self.current = Selection::None;
    }

    pub fn current(&self) -> &Selection {
        &self.current
    }

    pub fn key_for(&self, kind: SelectionKind) -> Option<&str> {
        self.current.key_for(kind)
    }
}
