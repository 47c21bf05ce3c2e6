//! Column layout of the inventory worksheet (`BDD`) and a typed accessor over
//! a raw row. Offsets are zero-based and must match the live sheet.

use super::Row;

/// Column holding the car name; the change-detection key.
pub const IDENTITY_COLUMN: usize = 22;

/// Column C: the catalog of items users may subscribe to.
pub const CATALOG_COLUMN: usize = 2;

/// Ratings are 0..=5 stars in the sheet; larger values are clamped.
pub const MAX_STARS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Vip,
    Name,
    Price,
    Color,
    Engine,
    Brake,
    Transmission,
    Suspension,
    Turbo,
}

impl Field {
    pub const fn offset(self) -> usize {
        match self {
            Field::Vip => 21,
            Field::Name => IDENTITY_COLUMN,
            Field::Price => 23,
            Field::Color => 24,
            Field::Engine => 26,
            Field::Brake => 27,
            Field::Transmission => 28,
            Field::Suspension => 29,
            Field::Turbo => 30,
        }
    }
}

/// Borrowed view over one row. Every getter is total: a missing column is
/// `None`, never a panic.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    cells: &'a [String],
}

impl<'a> RowView<'a> {
    pub fn new(cells: &'a [String]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &'a [String] {
        self.cells
    }

    /// Trimmed cell content, `None` when the row is too short.
    pub fn cell(&self, field: Field) -> Option<&'a str> {
        self.cells.get(field.offset()).map(|c| c.trim())
    }

    /// Like `cell`, but empty cells are `None` too.
    pub fn text(&self, field: Field) -> Option<&'a str> {
        self.cell(field).filter(|s| !s.is_empty())
    }

    pub fn identity(&self) -> Option<&'a str> {
        self.text(Field::Name)
    }

    /// More cells than the identity offset and a non-blank identity.
    pub fn is_meaningful(&self) -> bool {
        self.cells.len() > IDENTITY_COLUMN && self.identity().is_some()
    }

    /// Digits only; anything else (sign, decimal point, words) is `None`.
    pub fn rating(&self, field: Field) -> Option<u8> {
        let raw = self.text(field)?;
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // all-digit but overflowing u64 is still "a lot of stars"
        let n = raw.parse::<u64>().unwrap_or(u64::MAX);
        Some(n.min(MAX_STARS as u64) as u8)
    }

    /// Case-insensitive `TRUE`; missing or anything else is false.
    pub fn flag(&self, field: Field) -> bool {
        self.cell(field)
            .is_some_and(|v| v.eq_ignore_ascii_case("TRUE"))
    }
}

/// Last meaningful row in table order; earlier ones are never inspected.
pub fn latest_meaningful(rows: &[Row]) -> Option<RowView<'_>> {
    rows.iter()
        .rev()
        .map(|r| RowView::new(r))
        .find(RowView::is_meaningful)
}
