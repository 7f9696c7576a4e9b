//! Component C: sequence-set parsing and compilation.
//!
//! Grammar grounded on the teacher's `imap-codec/src/sequence.rs`
//! (`seq-number`, `seq-range`, `sequence-set` parsed with `nom`); the
//! seq-vs-UID `*` semantics and the compilation to both a flat id list and a
//! store-side predicate plan are spec.md §4.C.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map, value};
use nom::multi::separated_list1;
use nom::sequence::separated_pair;
use nom::IResult;
use std::collections::BTreeSet;

use crate::error::SequenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqNumber {
    Value(u32),
    /// `*`: the largest sequence number (or UID) present in the mailbox.
    Largest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqRange {
    Single(SeqNumber),
    Range(SeqNumber, SeqNumber),
}

/// A parsed `sequence-set`, not yet resolved against a mailbox size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet(Vec<SeqRange>);

fn seq_number(input: &str) -> IResult<&str, SeqNumber> {
    alt((
        value(SeqNumber::Largest, tag("*")),
        map(digit1, |s: &str| SeqNumber::Value(s.parse().unwrap())),
    ))(input)
}

fn seq_range(input: &str) -> IResult<&str, SeqRange> {
    alt((
        map(separated_pair(seq_number, tag(":"), seq_number), |(a, b)| {
            SeqRange::Range(a, b)
        }),
        map(seq_number, SeqRange::Single),
    ))(input)
}

fn sequence_set(input: &str) -> IResult<&str, Vec<SeqRange>> {
    separated_list1(tag(","), seq_range)(input)
}

impl SequenceSet {
    /// Parse a `set` token's text (e.g. `"1,3:5,7:*"`).
    pub fn parse(input: &str) -> Result<SequenceSet, SequenceError> {
        if input.is_empty() {
            return Err(SequenceError::Malformed("empty sequence set".into()));
        }
        all_consuming(sequence_set)(input)
            .map(|(_, ranges)| SequenceSet(ranges))
            .map_err(|_| SequenceError::Malformed(input.to_string()))
    }

    /// Resolve `*` against `largest` (the highest sequence number or UID
    /// currently valid) and expand into a sorted, deduplicated list of ids
    /// clipped to `[1, largest]`.
    ///
    /// `largest == 0` means an empty mailbox: in UID mode this is the
    /// sentinel spec.md §4.C calls out, where every range collapses to
    /// nothing and the whole set therefore matches no message (UID 0 does
    /// not exist, so `*` as UID 0 can never equal a real message).
    pub fn resolve(&self, largest: u32) -> Vec<u32> {
        let mut out = BTreeSet::new();
        for r in &self.0 {
            match r {
                SeqRange::Single(n) => {
                    if let Some(v) = resolve_number(*n, largest) {
                        out.insert(v);
                    }
                }
                SeqRange::Range(a, b) => {
                    let (Some(av), Some(bv)) = (resolve_number(*a, largest), resolve_number(*b, largest)) else {
                        continue;
                    };
                    let (lo, hi) = if av <= bv { (av, bv) } else { (bv, av) };
                    for v in lo..=hi {
                        if v >= 1 && v <= largest {
                            out.insert(v);
                        }
                    }
                }
            }
        }
        out.into_iter().collect()
    }

    /// A store-side restriction plan: an OR of per-range predicates, meant
    /// to be ANDed by the caller with "id exists in this mailbox" so that a
    /// `largest == 0` empty-mailbox `*` sentinel never spuriously matches.
    pub fn to_predicate_plan(&self, largest: u32) -> PredicatePlan {
        let mut ranges = Vec::new();
        for r in &self.0 {
            match r {
                SeqRange::Single(n) => {
                    if let Some(v) = resolve_number(*n, largest) {
                        ranges.push((v, v));
                    }
                }
                SeqRange::Range(a, b) => {
                    let (Some(av), Some(bv)) = (resolve_number(*a, largest), resolve_number(*b, largest)) else {
                        continue;
                    };
                    let (lo, hi) = if av <= bv { (av, bv) } else { (bv, av) };
                    ranges.push((lo.max(1), hi.min(largest.max(lo.max(1)))));
                }
            }
        }
        PredicatePlan { ranges }
    }
}

fn resolve_number(n: SeqNumber, largest: u32) -> Option<u32> {
    match n {
        SeqNumber::Value(v) => Some(v),
        SeqNumber::Largest => {
            if largest == 0 {
                None
            } else {
                Some(largest)
            }
        }
    }
}

/// An OR-of-ranges restriction, each endpoint already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicatePlan {
    pub ranges: Vec<(u32, u32)>,
}

impl PredicatePlan {
    pub fn matches(&self, id: u32) -> bool {
        self.ranges.iter().any(|&(lo, hi)| id >= lo && id <= hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_range_and_star() {
        let set = SequenceSet::parse("1,3:5,7:*").unwrap();
        assert_eq!(set.resolve(9), vec![1, 3, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn reversed_range_is_reordered() {
        let set = SequenceSet::parse("5:3").unwrap();
        assert_eq!(set.resolve(10), vec![3, 4, 5]);
    }

    #[test]
    fn star_alone_is_the_largest() {
        let set = SequenceSet::parse("*").unwrap();
        assert_eq!(set.resolve(42), vec![42]);
    }

    #[test]
    fn empty_mailbox_star_matches_nothing() {
        let set = SequenceSet::parse("*").unwrap();
        assert_eq!(set.resolve(0), Vec::<u32>::new());
        let plan = set.to_predicate_plan(0);
        assert!(!plan.matches(0));
        assert!(!plan.matches(1));
    }

    #[test]
    fn duplicates_collapse_and_stay_sorted() {
        let set = SequenceSet::parse("5,1:3,2").unwrap();
        assert_eq!(set.resolve(10), vec![1, 2, 3, 5]);
    }

    #[test]
    fn predicate_plan_matches_same_ids_as_resolve() {
        let set = SequenceSet::parse("2:4,8").unwrap();
        let plan = set.to_predicate_plan(10);
        let resolved = set.resolve(10);
        for id in 1..=10 {
            assert_eq!(plan.matches(id), resolved.contains(&id));
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(SequenceSet::parse("1,,2").is_err());
        assert!(SequenceSet::parse("").is_err());
        assert!(SequenceSet::parse("abc").is_err());
    }
}
