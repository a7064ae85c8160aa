//! Pure table projection.
//!
//! A freshly fetched row sequence plus the current selection key (and,
//! for instructions, a highlight token) becomes a [`RenderedTable`]. The
//! previous rendering is never consulted: each call builds the table from
//! scratch, so a re-render after a poll restores the selected row purely
//! by matching identity keys.

use std::fmt;

use crate::api::{
    ChatMessage, ExecStatRow, ExecutionStep, FunctionRow, InstructionRow, ProgramRow, RunStatRow,
    UserRow,
};
use crate::error::ClientResult;

/// Shown in place of rows when a fetch fails at the transport level.
pub const CONNECTION_ERROR: &str = "Server connection error.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub empty_message: &'static str,
    /// First column is the row number.
    pub numbered: bool,
}

impl TableSpec {
    pub fn columns(&self) -> usize {
        self.headers.len()
    }
}

pub const USERS: TableSpec = TableSpec {
    name: "users",
    headers: &["#", "User", "Programs", "Functions", "Credits", "Spent", "Runs"],
    empty_message: "No connected users.",
    numbered: true,
};

pub const PROGRAMS: TableSpec = TableSpec {
    name: "programs",
    headers: &["#", "Name", "User", "Instructions", "Max cost", "Runs", "Avg cost"],
    empty_message: "No programs available.",
    numbered: true,
};

pub const FUNCTIONS: TableSpec = TableSpec {
    name: "functions",
    headers: &["#", "Name", "Program", "User", "Instructions", "Max cost"],
    empty_message: "No functions available.",
    numbered: true,
};

pub const STATISTICS: TableSpec = TableSpec {
    name: "statistics",
    headers: &["#", "Type", "Name", "Arch", "Degree", "Result", "Cycles"],
    empty_message: "No statistics available.",
    numbered: true,
};

pub const INSTRUCTIONS: TableSpec = TableSpec {
    name: "instructions",
    headers: &["#", "Type", "Arch", "Label", "Instruction", "Cycles"],
    empty_message: "No instructions found.",
    numbered: true,
};

pub const HISTORY: TableSpec = TableSpec {
    name: "history",
    headers: &["#", "Type", "Arch", "Label", "Instruction", "Cycles"],
    empty_message: "No instruction history found.",
    numbered: true,
};

pub const RUN_HISTORY: TableSpec = TableSpec {
    name: "run_history",
    headers: &["#", "Degree", "Inputs", "Result", "Cycles"],
    empty_message: "No run history available.",
    numbered: true,
};

pub const RUN_RESULTS: TableSpec = TableSpec {
    name: "run_results",
    headers: &["Variable", "Value"],
    empty_message: "No results.",
    numbered: false,
};

pub const CHAT: TableSpec = TableSpec {
    name: "chat",
    headers: &["User", "Message", "Time"],
    empty_message: "No messages yet.",
    numbered: false,
};

/// What a table needs to know about one fetched item.
pub trait TableRow {
    /// Explicit row number; rows without one are numbered by position.
    fn number(&self) -> Option<i64> {
        None
    }

    /// Key matched against the selection on every re-render.
    fn identity_key(&self) -> Option<String> {
        None
    }

    /// Cells after the number column, with defaults for missing fields.
    fn cells(&self) -> Vec<String>;

    /// Texts searched for the highlight token.
    fn highlight_texts(&self) -> Vec<&str> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedRow {
    Placeholder {
        message: String,
        colspan: usize,
    },
    Data {
        cells: Vec<String>,
        key: Option<String>,
        selected: bool,
        highlighted: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTable {
    pub spec: TableSpec,
    pub rows: Vec<RenderedRow>,
}

impl RenderedTable {
    pub fn placeholder(spec: TableSpec, message: &str) -> Self {
        let row =
            RenderedRow::Placeholder { message: message.to_string(), colspan: spec.columns() };
        Self { spec, rows: vec![row] }
    }

    /// Nothing fetched yet.
    pub fn blank(spec: TableSpec) -> Self {
        Self { spec, rows: Vec::new() }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.rows.as_slice(), [RenderedRow::Placeholder { .. }])
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.rows.iter().find_map(|r| match r {
            RenderedRow::Data { selected: true, key, .. } => key.as_deref(),
            _ => None,
        })
    }

    pub fn data_rows(&self) -> impl Iterator<Item = (&[String], bool, bool)> {
        self.rows.iter().filter_map(|r| match r {
            RenderedRow::Data { cells, selected, highlighted, .. } => {
                Some((cells.as_slice(), *selected, *highlighted))
            }
            _ => None,
        })
    }
}

pub fn render<R: TableRow>(
    spec: TableSpec,
    rows: &[R],
    selected_key: Option<&str>,
    highlight: Option<&str>,
) -> RenderedTable {
    if rows.is_empty() {
        return RenderedTable::placeholder(spec, spec.empty_message);
    }
    let token = highlight.filter(|t| highlight_enabled(t));

    let rendered = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut cells = Vec::with_capacity(spec.columns());
            if spec.numbered {
                cells.push(row.number().unwrap_or(index as i64 + 1).to_string());
            }
            cells.extend(row.cells());
            let key = row.identity_key();
            let selected = matches!((&key, selected_key), (Some(k), Some(s)) if k == s);
            let highlighted = token
                .map(|t| row.highlight_texts().iter().any(|s| contains_whole_word(s, t)))
                .unwrap_or(false);
            RenderedRow::Data { cells, key, selected, highlighted }
        })
        .collect();

    RenderedTable { spec, rows: rendered }
}

/// Table for a fetch outcome: blank before the first reply, rows on
/// success, one placeholder row on failure.
pub fn project<R: TableRow>(
    spec: TableSpec,
    value: Option<&ClientResult<Vec<R>>>,
    selected_key: Option<&str>,
    highlight: Option<&str>,
) -> RenderedTable {
    match value {
        None => RenderedTable::blank(spec),
        Some(Ok(rows)) => render(spec, rows, selected_key, highlight),
        Some(Err(err)) if err.is_transport() => RenderedTable::placeholder(spec, CONNECTION_ERROR),
        Some(Err(err)) => RenderedTable::placeholder(spec, &err.to_string()),
    }
}

/// `none` and the empty token turn highlighting off.
pub fn highlight_enabled(token: &str) -> bool {
    !token.is_empty() && token != "none"
}

fn is_word(c: Option<char>) -> bool {
    c.map(|c| c.is_ascii_alphanumeric() || c == '_').unwrap_or(false)
}

/// Case-sensitive match of `token` bounded by word boundaries on both
/// sides, with the usual `\b` semantics (ASCII word characters).
pub fn contains_whole_word(text: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let first = token.chars().next();
    let last = token.chars().next_back();
    text.match_indices(token).any(|(start, m)| {
        let before = text[..start].chars().next_back();
        let after = text[start + m.len()..].chars().next();
        is_word(before) != is_word(first) && is_word(last) != is_word(after)
    })
}

fn text(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn int(v: Option<i64>) -> String {
    v.unwrap_or(0).to_string()
}

fn float(v: Option<f64>) -> String {
    format_amount(v.unwrap_or(0.0))
}

/// Whole amounts print without a fractional part.
pub fn format_amount(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

impl TableRow for UserRow {
    fn identity_key(&self) -> Option<String> {
        self.user_name.clone()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            text(&self.user_name),
            int(self.uploaded_programs),
            int(self.uploaded_functions),
            int(self.credit_balance),
            int(self.spent_credits),
            int(self.executions),
        ]
    }
}

impl TableRow for ProgramRow {
    fn number(&self) -> Option<i64> {
        self.number
    }

    fn identity_key(&self) -> Option<String> {
        self.name.clone()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            text(&self.name),
            text(&self.user_name),
            int(self.num_instructions),
            int(self.max_cost),
            int(self.num_exec),
            float(self.aver_cost),
        ]
    }
}

impl TableRow for FunctionRow {
    fn number(&self) -> Option<i64> {
        self.number
    }

    fn identity_key(&self) -> Option<String> {
        self.name.clone()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            text(&self.name),
            text(&self.program_name),
            text(&self.user_name),
            int(self.num_instructions),
            int(self.max_cost),
        ]
    }
}

impl TableRow for ExecStatRow {
    fn number(&self) -> Option<i64> {
        self.number
    }

    fn cells(&self) -> Vec<String> {
        vec![
            text(&self.kind),
            text(&self.name),
            text(&self.arch),
            int(self.degree),
            int(self.result),
            int(self.cycles),
        ]
    }
}

impl TableRow for InstructionRow {
    fn number(&self) -> Option<i64> {
        self.number
    }

    fn identity_key(&self) -> Option<String> {
        self.number.map(|n| n.to_string())
    }

    fn cells(&self) -> Vec<String> {
        vec![
            text(&self.kind),
            text(&self.arch),
            text(&self.label),
            text(&self.instruction),
            self.cycle.map(|c| c.to_string()).unwrap_or_default(),
        ]
    }

    fn highlight_texts(&self) -> Vec<&str> {
        [self.label.as_deref(), self.instruction.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl TableRow for RunStatRow {
    fn cells(&self) -> Vec<String> {
        vec![int(self.degree), text(&self.input_vars), int(self.result), int(self.cycles)]
    }
}

/// One name→value line of a run's final variable bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRow {
    pub name: String,
    pub value: i64,
}

impl TableRow for ChatMessage {
    fn cells(&self) -> Vec<String> {
        vec![text(&self.username), text(&self.message), text(&self.timestamp)]
    }
}

impl TableRow for VariableRow {
    fn identity_key(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn cells(&self) -> Vec<String> {
        vec![self.name.clone(), self.value.to_string()]
    }
}

pub fn variable_rows(step: &ExecutionStep) -> Vec<VariableRow> {
    step.variables
        .iter()
        .map(|(name, value)| VariableRow { name: name.clone(), value: *value })
        .collect()
}

impl fmt::Display for RenderedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.spec.name)?;
        writeln!(f, "  {}", self.spec.headers.join(" | "))?;
        for row in &self.rows {
            match row {
                RenderedRow::Placeholder { message, .. } => writeln!(f, "  {}", message)?,
                RenderedRow::Data { cells, selected, highlighted, .. } => {
                    let marker = match (selected, highlighted) {
                        (true, _) => '>',
                        (false, true) => '*',
                        _ => ' ',
                    };
                    writeln!(f, "{} {}", marker, cells.join(" | "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(name: &str, number: Option<i64>) -> ProgramRow {
        ProgramRow {
            name: Some(name.to_string()),
            number,
            max_cost: Some(10),
            aver_cost: Some(5.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_programs_render_single_placeholder() {
        let table = render::<ProgramRow>(PROGRAMS, &[], None, None);
        assert_eq!(
            table.rows,
            vec![RenderedRow::Placeholder { message: "No programs available.".into(), colspan: 7 }]
        );
    }

    #[test]
    fn test_rows_numbered_by_field_or_position() {
        let rows = vec![program("a", None), program("b", Some(9)), program("c", None)];
        let table = render(PROGRAMS, &rows, None, None);
        let numbers: Vec<&str> = table.data_rows().map(|(cells, _, _)| cells[0].as_str()).collect();
        assert_eq!(numbers, vec!["1", "9", "3"]);
        assert_eq!(table.rows.len(), 3);
    }

    #[test]
    fn test_selection_follows_key_not_position() {
        let before = vec![program("a", None), program("b", None)];
        let after = vec![program("c", None), program("b", None), program("a", None)];
        assert_eq!(render(PROGRAMS, &before, Some("b"), None).selected_key(), Some("b"));
        let table = render(PROGRAMS, &after, Some("b"), None);
        let flags: Vec<bool> = table.data_rows().map(|(_, s, _)| s).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let table = render(USERS, &[UserRow::default()], None, None);
        let (cells, _, _) = table.data_rows().next().unwrap();
        assert_eq!(cells, &["1", "", "0", "0", "0", "0", "0"]);
        assert_eq!(cells.len(), USERS.columns());
    }

    #[test]
    fn test_whole_word_highlight() {
        assert!(contains_whole_word("x1 <- x1 + 1", "x1"));
        assert!(!contains_whole_word("x12 <- 0", "x1"));
        assert!(!contains_whole_word("X1 <- 0", "x1"));
        assert!(contains_whole_word("IF z1 != 0 GOTO L2", "L2"));
        assert!(!contains_whole_word("GOTO L23", "L2"));
        assert!(!contains_whole_word("anything", ""));
    }

    #[test]
    fn test_highlight_token_none_disables() {
        let rows = vec![InstructionRow {
            number: Some(1),
            label: Some("none".into()),
            instruction: Some("y <- y + 1".into()),
            ..Default::default()
        }];
        let lit = render(INSTRUCTIONS, &rows, None, Some("y"));
        assert!(lit.data_rows().next().unwrap().2);
        let off = render(INSTRUCTIONS, &rows, None, Some("none"));
        assert!(!off.data_rows().next().unwrap().2);
        let off = render(INSTRUCTIONS, &rows, None, Some(""));
        assert!(!off.data_rows().next().unwrap().2);
    }

    #[test]
    fn test_highlight_checks_label_too() {
        let rows = vec![InstructionRow {
            label: Some("L1".into()),
            instruction: Some("y <- y".into()),
            ..Default::default()
        }];
        assert!(render(INSTRUCTIONS, &rows, None, Some("L1")).data_rows().next().unwrap().2);
    }

    #[test]
    fn test_run_results_are_not_numbered() {
        let step = ExecutionStep {
            step: 4,
            variables: [("y".to_string(), 7), ("x1".to_string(), 3)].into_iter().collect(),
            step_cost: 0,
        };
        let table = render(RUN_RESULTS, &variable_rows(&step), None, None);
        let rows: Vec<Vec<String>> = table.data_rows().map(|(c, _, _)| c.to_vec()).collect();
        assert_eq!(
            rows,
            vec![vec!["x1".to_string(), "3".to_string()], vec!["y".to_string(), "7".to_string()]]
        );
    }

    #[test]
    fn test_float_cells() {
        assert_eq!(float(Some(5.0)), "5");
        assert_eq!(float(Some(2.5)), "2.5");
        assert_eq!(float(None), "0");
    }
}
