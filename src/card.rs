// src/card.rs
// Bingo card generation and prize evaluation.
//
// A card is built from a fixed catalogue of 18 row templates (each marking 5
// of 9 columns). The rows are shuffled, every marked cell gets a number from
// its column band, and the rows are grouped three at a time into 6 blocks.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::defs::{column_band, Number, CARDLAYOUT, COLUMNS, LASTNUMBER, ROWS_PER_BLOCK, TEMPLATE_ROWS};
use crate::prize::Prize;

pub type Row = [Option<Number>; COLUMNS];

// Column totals are 9, 10, 10, 10, 10, 10, 10, 10, 11: exactly the size of
// each column band, so a fully populated template uses every number once.
const TEMPLATE: [[u8; COLUMNS]; TEMPLATE_ROWS] = [
    [0, 1, 1, 0, 0, 0, 1, 1, 1], [1, 0, 1, 0, 1, 1, 0, 1, 0], [0, 0, 1, 1, 1, 1, 1, 0, 0],
    [0, 0, 1, 1, 0, 0, 1, 1, 1], [1, 0, 0, 0, 1, 1, 1, 0, 1], [0, 1, 1, 0, 1, 0, 1, 0, 1],
    [0, 1, 0, 1, 0, 1, 1, 1, 0], [1, 0, 0, 1, 0, 1, 0, 1, 1], [1, 1, 1, 1, 1, 0, 0, 0, 0],
    [0, 1, 1, 0, 1, 1, 0, 0, 1], [1, 1, 0, 0, 0, 1, 1, 1, 0], [1, 1, 0, 1, 0, 1, 0, 1, 0],
    [1, 0, 0, 1, 1, 0, 0, 1, 1], [1, 0, 0, 0, 0, 1, 1, 1, 1], [0, 1, 1, 1, 0, 0, 1, 0, 1],
    [0, 1, 1, 1, 1, 1, 0, 0, 0], [0, 1, 1, 0, 1, 0, 0, 1, 1], [1, 0, 0, 1, 1, 0, 1, 0, 1],
];

/// Three rows of a card, evaluated together for line prizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub rows: [Row; ROWS_PER_BLOCK],
}

impl Block {
    pub fn new(rows: [Row; ROWS_PER_BLOCK]) -> Self {
        Self { rows }
    }

    /// Number of rows whose populated cells have all been observed.
    pub fn validate_marked_rows(&self, observed: &[Number]) -> usize {
        self.rows
            .iter()
            .filter(|row| {
                let marked = row
                    .iter()
                    .flatten()
                    .filter(|number| observed.contains(number))
                    .count();
                marked == CARDLAYOUT.numbers_per_row
            })
            .count()
    }

    pub fn numbers(&self) -> impl Iterator<Item = Number> + '_ {
        self.rows.iter().flat_map(|row| row.iter().flatten().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub blocks: Vec<Block>,
}

impl Card {
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let id = format!("{:016X}", card_hash(&blocks));
        Self { id, blocks }
    }

    /// Highest prize the observed numbers earn on this card, if any.
    /// Only the single best tier is reported.
    pub fn check_for_awards(&self, observed: &[Number]) -> Option<Prize> {
        let best = self
            .blocks
            .iter()
            .map(|block| block.validate_marked_rows(observed))
            .max()
            .unwrap_or(0);
        Prize::from_completed_rows(best)
    }

    pub fn numbers(&self) -> impl Iterator<Item = Number> + '_ {
        self.blocks.iter().flat_map(Block::numbers)
    }

    pub fn contains(&self, number: Number) -> bool {
        self.numbers().any(|n| n == number)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.blocks.iter().flat_map(|block| block.rows.iter())
    }

    /// Structural check: 5 numbers per row, every number in its column band,
    /// no number used twice.
    pub fn is_valid(&self) -> bool {
        let mut seen = [false; LASTNUMBER as usize + 1];
        for row in self.rows() {
            if row.iter().flatten().count() != CARDLAYOUT.numbers_per_row {
                return false;
            }
            for (column, cell) in row.iter().enumerate() {
                if let Some(number) = *cell {
                    let (min, max) = column_band(column);
                    if number < min || number > max || seen[number as usize] {
                        return false;
                    }
                    seen[number as usize] = true;
                }
            }
        }
        true
    }
}

fn card_hash(blocks: &[Block]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for block in blocks {
        for row in &block.rows {
            for cell in row {
                // 0 stands for an empty cell
                hasher.write_u8(cell.unwrap_or(0));
            }
        }
    }
    hasher.finish()
}

#[derive(Debug, Clone, Default)]
pub struct CardGenerator;

impl CardGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> Card {
        self.generate_with(&mut rand::rng())
    }

    pub fn generate_with<R: Rng>(&self, rng: &mut R) -> Card {
        // Step 1: shuffle the template rows
        let mut template = TEMPLATE.to_vec();
        template.shuffle(rng);

        // Step 2: populate every marked cell from its column band
        let rows = self.populate(&template, rng);

        // Step 3: group consecutive rows into blocks, keeping the shuffle order
        let blocks = rows
            .chunks(ROWS_PER_BLOCK)
            .map(|chunk| Block::new([chunk[0], chunk[1], chunk[2]]))
            .collect();

        Card::from_blocks(blocks)
    }

    fn populate<R: Rng>(&self, template: &[[u8; COLUMNS]], rng: &mut R) -> Vec<Row> {
        let mut used = [false; LASTNUMBER as usize + 1];

        template
            .iter()
            .map(|template_row| {
                let mut row: Row = [None; COLUMNS];
                for (column, &marked) in template_row.iter().enumerate() {
                    if marked == 0 {
                        continue;
                    }
                    let (min, max) = column_band(column);
                    let naive = rng.random_range(min..=max);
                    let number = resolve_collision(naive, min, max, &used);
                    used[number as usize] = true;
                    row[column] = Some(number);
                }
                row
            })
            .collect()
    }
}

/// Keep the naive pick when it is free; otherwise walk upward from the band
/// minimum and take the first unused number.
pub fn resolve_collision(naive: Number, min: Number, max: Number, used: &[bool]) -> Number {
    if !used[naive as usize] {
        return naive;
    }
    let probed = (min..=max).find(|&candidate| !used[candidate as usize]);
    // The template never asks a column for more numbers than its band holds.
    debug_assert!(probed.is_some(), "column band {min}-{max} exhausted");
    probed.unwrap_or(naive)
}
