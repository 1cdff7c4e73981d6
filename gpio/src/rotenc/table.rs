/// Marks a transition where both channels flipped between two samples.
///
/// The direction can't be told, so the step is dropped.
pub const AMBIGUOUS: i8 = 2;

/// Position change for every pair of consecutive samples.
///
/// Indexed by `prev_a << 3 | prev_b << 2 | a << 1 | b`. The channels walk the Gray code
/// `00 -> 10 -> 11 -> 01 -> 00` when turning clockwise.
///
/// | previous | now  | index | change |
/// |----------|------|-------|--------|
/// | 0 0      | 0 0  |  0    |  0     |
/// | 0 0      | 0 1  |  1    | -1     |
/// | 0 0      | 1 0  |  2    | +1     |
/// | 0 0      | 1 1  |  3    |  ?     |
/// | 0 1      | 0 0  |  4    | +1     |
/// | 0 1      | 0 1  |  5    |  0     |
/// | 0 1      | 1 0  |  6    |  ?     |
/// | 0 1      | 1 1  |  7    | -1     |
/// | 1 0      | 0 0  |  8    | -1     |
/// | 1 0      | 0 1  |  9    |  ?     |
/// | 1 0      | 1 0  | 10    |  0     |
/// | 1 0      | 1 1  | 11    | +1     |
/// | 1 1      | 0 0  | 12    |  ?     |
/// | 1 1      | 0 1  | 13    | +1     |
/// | 1 1      | 1 0  | 14    | -1     |
/// | 1 1      | 1 1  | 15    |  0     |
pub const TRANSITION_TABLE: [i8; 16] = [
     0, -1,  1,  2,
     1,  0,  2, -1,
    -1,  2,  0,  1,
     2,  1, -1,  0,
];

/// Gets the table index for a previous and a current `(a, b)` sample.
pub fn transition_index(previous: (bool, bool), current: (bool, bool)) -> usize {
    (previous.0 as usize) << 3 | (previous.1 as usize) << 2 | (current.0 as usize) << 1 | current.1 as usize
}

/// Gets the position change for a transition, or `None` if it is ambiguous.
pub fn transition_delta(previous: (bool, bool), current: (bool, bool)) -> Option<i8> {
    match TRANSITION_TABLE[transition_index(previous, current)] {
        AMBIGUOUS => None,
        delta => Some(delta),
    }
}

/// Position of the encoder together with the last sampled channel levels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EncoderState {
    pub position: i64,
    prev_a: bool,
    prev_b: bool,
}

impl EncoderState {
    pub fn previous(&self) -> (bool, bool) {
        (self.prev_a, self.prev_b)
    }

    /// Applies a fresh sample, returning the change added to the position.
    ///
    /// An ambiguous transition adds nothing but still becomes the previous sample.
    pub fn apply(&mut self, a: bool, b: bool) -> i8 {
        let delta = transition_delta(self.previous(), (a, b)).unwrap_or(0);
        self.position = self.position.wrapping_add(delta as i64);
        self.prev_a = a;
        self.prev_b = b;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bits(index: usize) -> ((bool, bool), (bool, bool)) {
        (
            (index & 0b1000 != 0, index & 0b0100 != 0),
            (index & 0b0010 != 0, index & 0b0001 != 0),
        )
    }

    #[test]
    fn table_fixture() {
        let expected: [Option<i8>; 16] = [
            Some(0), Some(-1), Some(1), None,
            Some(1), Some(0), None, Some(-1),
            Some(-1), None, Some(0), Some(1),
            None, Some(1), Some(-1), Some(0),
        ];
        for (index, &delta) in expected.iter().enumerate() {
            let (previous, current) = bits(index);
            assert_eq!(transition_index(previous, current), index);
            assert_eq!(transition_delta(previous, current), delta, "index {index}");
        }
    }

    #[test]
    fn ambiguous_indices_flip_both_bits() {
        for index in [3, 6, 9, 12] {
            assert_eq!(TRANSITION_TABLE[index], AMBIGUOUS);
            let (previous, current) = bits(index);
            assert!(previous.0 != current.0 && previous.1 != current.1);
        }
    }

    #[test]
    fn clockwise_steps_accumulate() {
        let mut state = EncoderState::default();
        // Indices 2, 11, 13.
        for (a, b) in [(true, false), (true, true), (false, true)] {
            assert_eq!(state.apply(a, b), 1);
        }
        assert_eq!(state.position, 3);
        assert_eq!(state.previous(), (false, true));
    }

    #[test]
    fn ambiguous_step_is_ignored() {
        let mut state = EncoderState::default();
        assert_eq!(state.apply(true, true), 0);
        assert_eq!(state.position, 0);
        assert_eq!(state.previous(), (true, true));
        // From 11, going to 10 is a counter-clockwise step.
        assert_eq!(state.apply(true, false), -1);
        assert_eq!(state.position, -1);
    }

    #[test]
    fn full_turn_each_way() {
        let mut state = EncoderState::default();
        let clockwise = [(true, false), (true, true), (false, true), (false, false)];
        for _ in 0..3 {
            for (a, b) in clockwise {
                state.apply(a, b);
            }
        }
        assert_eq!(state.position, 12);

        for (a, b) in clockwise.iter().rev().skip(1).chain([(false, false)].iter()) {
            state.apply(*a, *b);
        }
        assert_eq!(state.position, 8);
    }

    proptest! {
        #[test]
        fn position_is_sum_of_table_deltas(samples in prop::collection::vec(any::<(bool, bool)>(), 0..200)) {
            let mut state = EncoderState::default();
            let mut previous = (false, false);
            let mut expected = 0i64;
            for &(a, b) in &samples {
                let delta = TRANSITION_TABLE[transition_index(previous, (a, b))];
                if delta != AMBIGUOUS {
                    expected += delta as i64;
                }
                previous = (a, b);
                state.apply(a, b);
            }
            prop_assert_eq!(state.position, expected);
        }

        #[test]
        fn reversing_a_walk_returns_home(steps in prop::collection::vec(any::<bool>(), 0..100)) {
            // Walk the Gray code one step at a time, then retrace it.
            const CODES: [(bool, bool); 4] = [(false, false), (true, false), (true, true), (false, true)];
            let mut state = EncoderState::default();
            let mut at = 0usize;
            let mut visited = vec![at];
            for &clockwise in &steps {
                at = if clockwise { (at + 1) % 4 } else { (at + 3) % 4 };
                visited.push(at);
                let (a, b) = CODES[at];
                state.apply(a, b);
            }
            let net: i64 = steps.iter().map(|&cw| if cw { 1 } else { -1 }).sum();
            prop_assert_eq!(state.position, net);

            for &code in visited.iter().rev().skip(1) {
                let (a, b) = CODES[code];
                state.apply(a, b);
            }
            prop_assert_eq!(state.position, 0);
        }
    }
}
