// src/defs.rs
// Numeric constants describing the bingo number range and the card layout.

pub type Number = u8;

pub const FIRSTNUMBER: Number = 1;
pub const LASTNUMBER: Number = 90;
pub const NUMBERSCOUNT: usize = (LASTNUMBER - FIRSTNUMBER + 1) as usize;

pub struct CardLayout {
    pub columns: usize,
    pub rows_per_block: usize,
    pub blocks_per_card: usize,
    pub numbers_per_row: usize,
}

pub const CARDLAYOUT: CardLayout = CardLayout {
    columns: 9,         // one column per band of ten numbers
    rows_per_block: 3,  // rows evaluated together for line prizes
    blocks_per_card: 6, // blocks handed out on one card
    numbers_per_row: 5, // populated cells in every row
};

pub const COLUMNS: usize = CARDLAYOUT.columns;
pub const ROWS_PER_BLOCK: usize = CARDLAYOUT.rows_per_block;
pub const TEMPLATE_ROWS: usize = CARDLAYOUT.rows_per_block * CARDLAYOUT.blocks_per_card;

/// Inclusive range of numbers a card column may hold.
///
/// Column 0 covers 1-9, column c covers 10c-10c+9, and the last column also
/// takes 90 so that the full 18-row template can be populated.
pub fn column_band(column: usize) -> (Number, Number) {
    let min = if column == 0 { FIRSTNUMBER } else { (column * 10) as Number };
    let max = if column + 1 == COLUMNS {
        LASTNUMBER
    } else {
        (column * 10 + 9) as Number
    };
    (min, max)
}
