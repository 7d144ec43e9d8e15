//! Leaf extraction from rendered document markup.
//!
//! The scanner works on the raw markup and records byte spans instead of
//! building a DOM, so regions that are not replaced stay byte-identical when
//! the markup is reassembled.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    // quoted attribute values may contain `>`
    Regex::new(r#"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9:-]*)\b(?:[^>"']|"[^"]*"|'[^']*')*?(/?)>"#)
        .expect("valid token pattern")
});

/// Which elements count as matchable leaf regions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LeafScope {
    /// `td` and `th` cells.
    #[default]
    TableCells,
    /// Any of the listed (lowercase) tag names.
    Tags(Vec<String>),
}

impl LeafScope {
    fn is_leaf_tag(&self, tag: &str) -> bool {
        match self {
            LeafScope::TableCells => is_cell_tag(tag),
            LeafScope::Tags(tags) => tags.iter().any(|t| t == tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeafLocator {
    TableCell {
        table: usize,
        row: usize,
        column: usize,
    },
    Tagged {
        tag: String,
        index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentLeaf {
    /// Position in traversal order.
    pub ordinal: usize,
    pub locator: LeafLocator,
    /// Byte range of the inner markup within the rendered document.
    #[serde(skip)]
    pub span: Range<usize>,
    pub markup: String,
}

/// A materialized rendered document: the markup plus its leaf regions.
#[derive(Debug, Clone, Default)]
pub struct ContentTree {
    markup: String,
    leaves: Vec<ContentLeaf>,
}

impl ContentTree {
    pub fn parse(markup: impl Into<String>, scope: &LeafScope) -> Self {
        let markup = markup.into();
        let leaves = extract_leaves(&markup, scope);
        Self { markup, leaves }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn leaves(&self) -> &[ContentLeaf] {
        &self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.markup.trim().is_empty()
    }
}

struct OpenLeaf {
    tag: String,
    inner_start: usize,
    locator: LeafLocator,
    /// Depth of the table stack when the leaf was opened.
    table_depth: usize,
    contains_leaf: bool,
}

struct TableCtx {
    index: usize,
    rows_seen: usize,
    current_row: Option<usize>,
    next_column: usize,
}

/// Collect leaf regions in document order. Only innermost leaves are
/// returned: an element that contains another leaf (a cell holding a nested
/// table) is skipped. Unclosed leaves are dropped.
pub fn extract_leaves(markup: &str, scope: &LeafScope) -> Vec<ContentLeaf> {
    let mut found: Vec<(Range<usize>, LeafLocator)> = Vec::new();
    let mut open: Vec<OpenLeaf> = Vec::new();
    let mut tables: Vec<TableCtx> = Vec::new();
    let mut tables_seen = 0usize;
    let mut tag_counts: HashMap<String, usize> = HashMap::new();

    for caps in TOKEN_RE.captures_iter(markup) {
        let Some(name) = caps.get(2) else {
            continue; // comment
        };
        let whole = caps.get(0).map(|m| m.start()..m.end()).unwrap_or(0..0);
        let tag = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(3).is_some_and(|m| !m.as_str().is_empty());

        if closing {
            match tag.as_str() {
                "tr" => close_cells(&mut open, &mut found, tables.len(), whole.start),
                "table" => {
                    close_cells(&mut open, &mut found, tables.len(), whole.start);
                    tables.pop();
                }
                _ => {}
            }
            if let Some(pos) = open.iter().rposition(|l| l.tag == tag) {
                // anything opened after it was never closed
                open.truncate(pos + 1);
                if let Some(leaf) = open.pop() {
                    emit(leaf, whole.start, &mut found);
                }
            }
            continue;
        }

        if self_closing {
            continue;
        }

        match tag.as_str() {
            "table" => {
                tables.push(TableCtx {
                    index: tables_seen,
                    rows_seen: 0,
                    current_row: None,
                    next_column: 0,
                });
                tables_seen += 1;
            }
            "tr" => {
                close_cells(&mut open, &mut found, tables.len(), whole.start);
                if let Some(ctx) = tables.last_mut() {
                    ctx.current_row = Some(ctx.rows_seen);
                    ctx.rows_seen += 1;
                    ctx.next_column = 0;
                }
            }
            _ => {}
        }

        let cell = is_cell_tag(&tag);
        let mut cell_locator = None;
        if cell {
            close_cells(&mut open, &mut found, tables.len(), whole.start);
            if let Some(ctx) = tables.last_mut() {
                let row = match ctx.current_row {
                    Some(row) => row,
                    None => {
                        // cell outside any <tr>: treat as an implicit row
                        let row = ctx.rows_seen;
                        ctx.rows_seen += 1;
                        ctx.current_row = Some(row);
                        row
                    }
                };
                cell_locator = Some(LeafLocator::TableCell {
                    table: ctx.index,
                    row,
                    column: ctx.next_column,
                });
                ctx.next_column += 1;
            }
        }

        if !scope.is_leaf_tag(&tag) {
            continue;
        }
        let locator = match cell_locator {
            Some(locator) => locator,
            None => {
                let count = tag_counts.entry(tag.clone()).or_insert(0);
                let locator = LeafLocator::Tagged {
                    tag: tag.clone(),
                    index: *count,
                };
                *count += 1;
                locator
            }
        };
        for parent in open.iter_mut() {
            parent.contains_leaf = true;
        }
        open.push(OpenLeaf {
            tag,
            inner_start: whole.end,
            locator,
            table_depth: tables.len(),
            contains_leaf: false,
        });
    }

    found.sort_by_key(|(span, _)| span.start);
    found
        .into_iter()
        .enumerate()
        .map(|(ordinal, (span, locator))| ContentLeaf {
            ordinal,
            locator,
            markup: markup[span.clone()].to_string(),
            span,
        })
        .collect()
}

fn is_cell_tag(tag: &str) -> bool {
    tag == "td" || tag == "th"
}

/// Implicitly close cells that belong to the current table, as HTML does when
/// a new cell or row starts without an end tag.
fn close_cells(
    open: &mut Vec<OpenLeaf>,
    found: &mut Vec<(Range<usize>, LeafLocator)>,
    table_depth: usize,
    end: usize,
) {
    while let Some(top) = open.last() {
        if !(is_cell_tag(&top.tag) && top.table_depth == table_depth && table_depth > 0) {
            break;
        }
        if let Some(leaf) = open.pop() {
            emit(leaf, end, found);
        }
    }
}

fn emit(leaf: OpenLeaf, end: usize, found: &mut Vec<(Range<usize>, LeafLocator)>) {
    if leaf.contains_leaf || end < leaf.inner_start {
        return;
    }
    found.push((leaf.inner_start..end, leaf.locator));
}
