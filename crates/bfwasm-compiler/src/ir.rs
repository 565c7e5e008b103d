use std::collections::BTreeMap;
use std::fmt::Write;

use crate::CompileError;

/// One instruction of the intermediate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inst {
    /// Add to the current cell
    Add(u32),
    /// Subtract from the current cell
    Sub(u32),
    /// Move the data pointer right
    Right(u32),
    /// Move the data pointer left
    Left(u32),
    /// Read one byte into the current cell
    In,
    /// Write the current cell
    Out,
    LoopStart,
    LoopEnd,
    /// Set the current cell to zero
    Zero,
    /// `cell[dp + offset] += cell[dp] * factor`, skipped when the current cell is zero
    MulAdd { offset: i32, factor: i32 },
}

pub type Ir = Vec<Inst>;

/// Translate source into IR; every character outside `+-<>[].,` is a comment
pub fn parse(program: &str) -> Ir {
    program
        .chars()
        .filter_map(|c| match c {
            '+' => Some(Inst::Add(1)),
            '-' => Some(Inst::Sub(1)),
            '>' => Some(Inst::Right(1)),
            '<' => Some(Inst::Left(1)),
            '[' => Some(Inst::LoopStart),
            ']' => Some(Inst::LoopEnd),
            '.' => Some(Inst::Out),
            ',' => Some(Inst::In),
            _ => None,
        })
        .collect()
}

/// Make sure every `[` has a matching `]`
pub fn check_brackets(program: &str) -> Result<(), CompileError> {
    let mut open = Vec::new();
    for (offset, c) in program.char_indices() {
        match c {
            '[' => open.push(offset),
            ']' => {
                if open.pop().is_none() {
                    return Err(CompileError::UnmatchedClose { offset });
                }
            }
            _ => (),
        }
    }

    match open.pop() {
        Some(offset) => Err(CompileError::UnmatchedOpen { offset }),
        None => Ok(()),
    }
}

/// Fold runs of the same `+ - < >` instruction into one counted instruction
pub fn combine_runs(ir: &[Inst]) -> Ir {
    let mut out: Ir = Vec::with_capacity(ir.len());
    for &inst in ir {
        match (out.last_mut(), inst) {
            (Some(Inst::Add(a)), Inst::Add(b))
            | (Some(Inst::Sub(a)), Inst::Sub(b))
            | (Some(Inst::Right(a)), Inst::Right(b))
            | (Some(Inst::Left(a)), Inst::Left(b)) => *a = a.wrapping_add(b),
            _ => out.push(inst),
        }
    }
    out
}

/// Replace `[-]`-style clearing loops with `Zero`
///
/// Only odd step counts are rewritten: an even step never reaches zero from
/// an odd starting value, so those loops have to keep their (infinite)
/// behaviour.
pub fn zero_cells(ir: &[Inst]) -> Ir {
    let mut out: Ir = Vec::with_capacity(ir.len());
    let mut idx = 0;
    while idx < ir.len() {
        if let [Inst::LoopStart, Inst::Add(n) | Inst::Sub(n), Inst::LoopEnd, ..] = &ir[idx..] {
            if n % 2 == 1 {
                out.push(Inst::Zero);
                idx += 3;
                continue;
            }
        }
        out.push(ir[idx]);
        idx += 1;
    }
    out
}

/// Rewrite innermost multiply loops such as `[->+++<]` into `MulAdd`s
///
/// A loop qualifies when its body only adds, subtracts and moves, ends where
/// it started and decrements the loop cell by exactly one per iteration.
///
/// With `bounds_check`, loops whose pointer walks past the cells they modify
/// are left alone, since the rewrite only guards the modified cells.
pub fn simple_loops(ir: &[Inst], bounds_check: bool) -> Ir {
    let mut out: Ir = Vec::with_capacity(ir.len());
    let mut idx = 0;
    while idx < ir.len() {
        if ir[idx] == Inst::LoopStart {
            if let Some((end, replacement)) = simple_loop_at(ir, idx, bounds_check) {
                out.extend(replacement);
                idx = end + 1;
                continue;
            }
        }
        out.push(ir[idx]);
        idx += 1;
    }
    out
}

fn simple_loop_at(ir: &[Inst], start: usize, bounds_check: bool) -> Option<(usize, Ir)> {
    let mut offset: i32 = 0;
    // Furthest cells the pointer visits, relative to the loop cell
    let (mut lowest, mut highest): (i32, i32) = (0, 0);
    let mut deltas: BTreeMap<i32, i32> = BTreeMap::new();

    for (idx, inst) in ir.iter().enumerate().skip(start + 1) {
        match *inst {
            Inst::Add(n) => {
                let d = deltas.entry(offset).or_default();
                *d = d.wrapping_add(n as i32);
            }
            Inst::Sub(n) => {
                let d = deltas.entry(offset).or_default();
                *d = d.wrapping_sub(n as i32);
            }
            Inst::Right(n) => {
                offset = offset.wrapping_add(n as i32);
                highest = highest.max(offset);
            }
            Inst::Left(n) => {
                offset = offset.wrapping_sub(n as i32);
                lowest = lowest.min(offset);
            }
            Inst::LoopEnd => {
                if offset != 0 {
                    return None;
                }
                let step = deltas.remove(&0).unwrap_or(0);
                if step.rem_euclid(256) != 255 {
                    return None;
                }

                let mut replacement: Ir = deltas
                    .into_iter()
                    .filter(|(_, factor)| factor.rem_euclid(256) != 0)
                    .map(|(offset, factor)| Inst::MulAdd { offset, factor })
                    .collect();

                if bounds_check {
                    let touched = replacement.iter().filter_map(|inst| match inst {
                        Inst::MulAdd { offset, .. } => Some(*offset),
                        _ => None,
                    });
                    let (low, high) = touched
                        .fold((0i32, 0i32), |(lo, hi), o| (lo.min(o), hi.max(o)));
                    if lowest < low || highest > high {
                        return None;
                    }
                }

                replacement.push(Inst::Zero);
                return Some((idx, replacement));
            }
            _ => return None,
        }
    }

    None
}

/// Indented listing of the IR, one instruction per line
pub fn format_ir(ir: &[Inst]) -> String {
    let mut out = String::new();
    let mut depth: usize = 0;
    for inst in ir {
        if *inst == Inst::LoopEnd {
            depth = depth.saturating_sub(1);
        }
        let _ = writeln!(out, "{}{:?}", "\t".repeat(depth), inst);
        if *inst == Inst::LoopStart {
            depth += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use Inst::*;

    #[test]
    fn test_parse_ignores_comments() {
        let ir = parse("a+b-c>d<e[f]g.h,\n");
        assert_eq!(
            ir,
            vec![Add(1), Sub(1), Right(1), Left(1), LoopStart, LoopEnd, Out, In]
        );
    }

    #[test]
    fn test_check_brackets() {
        assert!(check_brackets("[[]][]").is_ok());
        assert!(matches!(
            check_brackets("+]"),
            Err(CompileError::UnmatchedClose { offset: 1 })
        ));
        assert!(matches!(
            check_brackets("[[]"),
            Err(CompileError::UnmatchedOpen { offset: 0 })
        ));
    }

    #[test]
    fn test_combine_runs() {
        let ir = combine_runs(&parse("+++-->>><.."));
        assert_eq!(ir, vec![Add(3), Sub(2), Right(3), Left(1), Out, Out]);
    }

    #[test]
    fn test_zero_cells() {
        let ir = zero_cells(&combine_runs(&parse("+[-]>[+++]<[--]")));
        assert_eq!(
            ir,
            vec![
                Add(1),
                Zero,
                Right(1),
                Zero,
                Left(1),
                LoopStart,
                Sub(2),
                LoopEnd
            ]
        );
    }

    #[test]
    fn test_simple_loops_multiply() {
        let ir = simple_loops(&combine_runs(&parse("[->+++>--<<]")), false);
        assert_eq!(
            ir,
            vec![
                MulAdd {
                    offset: 1,
                    factor: 3
                },
                MulAdd {
                    offset: 2,
                    factor: -2
                },
                Zero
            ]
        );
    }

    #[test]
    fn test_simple_loops_body_after_decrement() {
        let ir = simple_loops(&combine_runs(&parse("[<+>-]")), false);
        assert_eq!(
            ir,
            vec![
                MulAdd {
                    offset: -1,
                    factor: 1
                },
                Zero
            ]
        );
    }

    #[test]
    fn test_simple_loops_rejects_complex_bodies() {
        for program in ["[->+<.]", "[->+]", "[-->+<]", "[->+<,]", "[>+<]"] {
            let ir = combine_runs(&parse(program));
            assert_eq!(simple_loops(&ir, false), ir, "{} should be left alone", program);
        }
    }

    #[test]
    fn test_simple_loops_only_rewrites_innermost() {
        let ir = simple_loops(&combine_runs(&parse("[>[->+<]<-]")), false);
        assert_eq!(
            ir,
            vec![
                LoopStart,
                Right(1),
                MulAdd {
                    offset: 1,
                    factor: 1
                },
                Zero,
                Left(1),
                Sub(1),
                LoopEnd
            ]
        );
    }

    #[test]
    fn test_simple_loops_keeps_excursions_when_checking_bounds() {
        // The pointer visits offset -2 but only the loop cell changes
        let ir = combine_runs(&parse("[-<<>>]"));
        assert_eq!(simple_loops(&ir, false), vec![Zero]);
        assert_eq!(simple_loops(&ir, true), ir);

        // Visiting offset 2 on the way to modify it is fine
        let ir = combine_runs(&parse("[->>+<<]"));
        assert_eq!(
            simple_loops(&ir, true),
            vec![
                MulAdd {
                    offset: 2,
                    factor: 1
                },
                Zero
            ]
        );

        // Zero net change to a cell does not count as touching it
        let ir = combine_runs(&parse("[->+-<]"));
        assert_eq!(simple_loops(&ir, true), ir);
    }

    #[test]
    fn test_format_ir_indents_loops() {
        let listing = format_ir(&[Add(2), LoopStart, Sub(1), LoopEnd, Out]);
        assert_eq!(listing, "Add(2)\nLoopStart\n\tSub(1)\nLoopEnd\nOut\n");
    }
}
