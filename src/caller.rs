// src/caller.rs
// The bingo caller: draws 1-90 without replacement in a shuffled order and
// keeps the history of everything called so far.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::defs::{Number, FIRSTNUMBER, LASTNUMBER, NUMBERSCOUNT};

/// Traditional call phrases, indexed by number. Index 0 is a placeholder.
pub const CALLS: [&str; NUMBERSCOUNT + 1] = [
    "Zero", "Kelly's Eye", "One Little Duck", "Cup of Tea", "Knock at the Door", "Man Alive",
    "Tom Mix", "Lucky Seven", "Garden Gate", "Doctor's Orders", "Cameron's Den", "Legs Eleven",
    "One Dozen", "Unlucky for Some", "Valentine's Day", "Young and Keen", "Sweet Sixteen",
    "Dancing Queen", "Coming of Age", "Goodbye Teens", "One Score", "Royal Salute",
    "Two Little Ducks", "Thee and Me", "Two Dozen", "Duck and Dive", "Pick and Mix",
    "Gateway to Heaven", "Over Weight", "Rise and Shine", "Dirty Gertie", "Get Up and Run",
    "Buckle My Shoe", "Dirty Knee", "Ask for More", "Jump and Jive", "Three Dozen",
    "More than Eleven", "Christmas Cake", "Steps", "Naughty 40", "Time for Fun",
    "Winnie the Pooh", "Down on Your Knees", "Droopy Drawers", "Halfway There", "Up to Tricks",
    "Four and Seven", "Four Dozen", "PC", "Half a Century", "Tweak of the Thumb",
    "Danny La Rue", "Stuck in the Tree", "Clean the Floor", "Snakes Alive", "Was She Worth It?",
    "Heinz Varieties", "Make Them Wait", "Brighton Line", "Five Dozen", "Bakers Bun",
    "Turn the Screw", "Tickle Me", "Red Raw", "Old Age Pension", "Clickety Click",
    "Made in Heaven", "Saving Grace", "Either Way Up", "Three Score and Ten", "Bang on the Drum",
    "Six Dozen", "Queen B", "Candy Store", "Strive and Strive", "Trombones", "Sunset Strip",
    "Heaven's Gate", "One More Time", "Eight and Blank", "Stop and Run", "Straight On Through",
    "Time for Tea", "Seven Dozen", "Staying Alive", "Between the Sticks", "Torquay in Devon",
    "Two Fat Ladies", "Nearly There", "Top of the Shop",
];

/// One drawn number together with its phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub number: Number,
    pub phrase: &'static str,
}

/// Result of a draw. `Exhausted` is the end-of-game signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    Called(Call),
    Exhausted,
}

impl Draw {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Draw::Exhausted)
    }
}

pub struct Caller {
    // Drawn from the back, so the last element is the next call.
    available: Vec<Number>,
    called: Vec<Number>,
}

impl Caller {
    pub fn new() -> Self {
        Self::with_rng(&mut rand::rng())
    }

    pub fn with_rng<R: Rng>(rng: &mut R) -> Self {
        let mut available: Vec<Number> = (FIRSTNUMBER..=LASTNUMBER).collect();
        // Fisher-Yates
        available.shuffle(rng);
        Caller {
            available,
            called: Vec::with_capacity(NUMBERSCOUNT),
        }
    }

    /// A caller that calls exactly `numbers`, in order.
    pub fn from_sequence(numbers: &[Number]) -> Self {
        let mut available = numbers.to_vec();
        available.reverse();
        Caller {
            available,
            called: Vec::new(),
        }
    }

    pub fn draw(&mut self) -> Draw {
        match self.available.pop() {
            Some(number) => {
                self.called.push(number);
                Draw::Called(Call {
                    number,
                    phrase: CALLS[number as usize],
                })
            }
            None => Draw::Exhausted,
        }
    }

    pub fn called_numbers(&self) -> &[Number] {
        &self.called
    }

    pub fn has_called(&self, number: Number) -> bool {
        self.called.contains(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

impl Default for Caller {
    fn default() -> Self {
        Self::new()
    }
}
