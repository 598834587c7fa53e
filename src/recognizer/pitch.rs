//! Staff positions, pitches and key-signature geometry.
//!
//! Positions count half spacings downwards: 1 is the top staff line, 9 the
//! bottom one, smaller values lie above the stave and larger ones below.

use crate::lines::Stave;
use crate::model::{ClefKind, Step};

/// Positions looked at beyond the outer lines, in half spacings.
const EXTRA_POSITIONS: i32 = 10;

/// Position reported when nothing is close enough.
pub const UNPLACED: i32 = 2 * EXTRA_POSITIONS;

/// Sharps of a key signature in order, with their treble-clef positions.
pub const SHARP_ORDER: [(Step, i32); 7] = [
    (Step::F, 1),
    (Step::C, 4),
    (Step::G, 0),
    (Step::D, 3),
    (Step::A, 6),
    (Step::E, 2),
    (Step::B, 5),
];

/// Flats of a key signature in order, with their treble-clef positions.
pub const FLAT_ORDER: [(Step, i32); 7] = [
    (Step::B, 5),
    (Step::E, 2),
    (Step::A, 6),
    (Step::D, 3),
    (Step::G, 7),
    (Step::C, 4),
    (Step::F, 8),
];

/// Bass-clef glyphs sit this many positions lower than treble ones.
pub const BASS_SHIFT: i32 = 2;

/// Staff position of the vertical coordinate `y`.
pub fn staff_position(y: i32, stave: &Stave, spacing: i32) -> i32 {
    let near = |target: i32| (y - target).abs() < spacing / 4;

    for i in 0..=EXTRA_POSITIONS {
        if near(stave.top() - i * spacing / 2) {
            return 1 - i;
        }
    }

    let mut position = 2;
    for i in 0..4 {
        if near((stave.line(i).y() + stave.line(i + 1).y()) / 2) {
            return position;
        }
        position += 1;
        if near(stave.line(i + 1).y()) {
            return position;
        }
        position += 1;
    }

    for i in 1..=EXTRA_POSITIONS {
        if near(stave.bottom() + i * spacing / 2) {
            return position;
        }
        position += 1;
    }
    UNPLACED
}

/// Vertical coordinate at which `position` lies.
pub fn position_y(stave: &Stave, position: i32, spacing: i32) -> i32 {
    match position {
        p if p <= 1 => stave.top() - (1 - p) * spacing / 2,
        p if p >= 9 => stave.bottom() + (p - 9) * spacing / 2,
        p if p % 2 == 1 => stave.line(((p - 1) / 2) as usize).y(),
        p => {
            let upper = stave.line(((p - 2) / 2) as usize).y();
            let lower = stave.line((p / 2) as usize).y();
            (upper + lower) / 2
        }
    }
}

/// Position as if the stave carried a treble clef.
pub fn treble_position(position: i32, clef: Option<ClefKind>) -> i32 {
    match clef {
        Some(ClefKind::Bass) => position + 12,
        _ => position,
    }
}

/// Step and octave at a treble-relative position.
pub fn step_and_octave(position: i32) -> (Step, i32) {
    let octave = match position {
        p if p <= -3 => 6,
        p if p <= 4 => 5,
        p if p <= 11 => 4,
        p if p <= 18 => 3,
        p if p <= 25 => 2,
        _ => 1,
    };
    let step = match (position + 700) % 7 {
        0 => Step::G,
        1 => Step::F,
        2 => Step::E,
        3 => Step::D,
        4 => Step::C,
        5 => Step::B,
        _ => Step::A,
    };
    (step, octave)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BoundingBox;

    fn stave() -> Stave {
        Stave {
            lines: [60, 72, 84, 96, 108].map(|y| BoundingBox::new(20, y, 579, y + 1)),
        }
    }

    #[test]
    fn positions_on_and_between_lines() {
        let s = stave();
        assert_eq!(staff_position(60, &s, 12), 1);
        assert_eq!(staff_position(67, &s, 12), 2);
        assert_eq!(staff_position(83, &s, 12), 5);
        assert_eq!(staff_position(108, &s, 12), 9);
        assert_eq!(staff_position(114, &s, 12), 10);
        assert_eq!(staff_position(48, &s, 12), -1);
        // halfway between two positions: nothing within a quarter spacing
        assert_eq!(staff_position(63, &s, 12), UNPLACED);
    }

    #[test]
    fn position_y_inverts_staff_position() {
        let s = stave();
        for p in -9..=19 {
            assert_eq!(staff_position(position_y(&s, p, 12), &s, 12), p, "position {p}");
        }
    }

    #[test]
    fn treble_and_bass_pitches() {
        assert_eq!(step_and_octave(1), (Step::F, 5));
        assert_eq!(step_and_octave(5), (Step::B, 4));
        assert_eq!(step_and_octave(11), (Step::C, 4));
        assert_eq!(step_and_octave(-3), (Step::C, 6));
        // bass clef: top line is A3, bottom line G2
        assert_eq!(step_and_octave(treble_position(1, Some(ClefKind::Bass))), (Step::A, 3));
        assert_eq!(step_and_octave(treble_position(9, Some(ClefKind::Bass))), (Step::G, 2));
    }
}
