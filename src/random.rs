/*
Copyright 2021 Robin Marchart

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

//! Resolved dice quantities and the policies that collapse them to a number.
//!
//! A [RandomValue] is the fully resolved `{base, dice, sides, m_bonus}` quad
//! produced from a formula for one evaluation pass. An [Aspect] picks how the
//! range it describes becomes a single integer. All randomness flows through
//! a caller-supplied [rand::Rng]; this module keeps no generator state.

#[cfg(feature = "roll")]
use rand::{distributions::Uniform, Rng};
#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Level values clamp below this in level-scaled calculations.
pub const MAX_LEVEL: i32 = 128;

/// A dice quantity with every component resolved to a plain integer:
/// `base + dice` rolls of a `sides`-sided die, plus a level-scaled magnitude
/// bonus capped at `m_bonus`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RandomValue {
    pub base: i32,
    pub dice: i32,
    pub sides: i32,
    pub m_bonus: i32,
}

impl RandomValue {
    /// Smallest possible outcome: every die shows 1 and the magnitude bonus
    /// contributes nothing.
    pub fn min(&self) -> i32 {
        self.base + self.dice
    }

    /// Largest possible outcome: every die shows its top face and the full
    /// magnitude bonus applies.
    pub fn max(&self) -> i32 {
        self.base + self.dice * self.sides + self.m_bonus
    }

    /// Expected outcome at the given level, using integer arithmetic.
    pub fn average(&self, level: i32) -> i32 {
        self.base + self.dice * (self.sides + 1) / 2 + self.m_bonus * level / MAX_LEVEL
    }

    /// Whether `test` lies inside the reachable range.
    pub fn contains(&self, test: i32) -> bool {
        test >= self.min() && test <= self.max()
    }

    /// Whether the value can come out differently between two rolls.
    pub fn varies(&self) -> bool {
        self.min() != self.max()
    }

    /// Whichever bound has the larger magnitude.
    fn extreme(&self) -> i32 {
        let min = self.min();
        let max = self.max();
        if min.abs() > max.abs() {
            min
        } else {
            max
        }
    }
}

/// Policy for collapsing a [RandomValue] into one integer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum Aspect {
    Minimise,
    Average,
    Maximise,
    /// Whichever of the two bounds is further from zero; relevant for
    /// quantities with negative components.
    Extremify,
    Randomise,
}

/// Roll `num` dice with `sides` faces each and sum them. Zero when either
/// count or faces is not positive.
#[cfg(feature = "roll")]
pub fn damroll<R: Rng>(num: i32, sides: i32, rng: &mut R) -> i32 {
    if num <= 0 || sides <= 0 {
        return 0;
    }
    let die = Uniform::new_inclusive(1, sides);
    (0..num).map(|_| rng.sample(die)).sum()
}

/// Collapse a resolved value under the chosen aspect. Only [Aspect::Randomise]
/// consumes randomness.
#[cfg(feature = "roll")]
pub fn randcalc<R: Rng>(v: RandomValue, level: i32, aspect: Aspect, rng: &mut R) -> i32 {
    match aspect {
        Aspect::Minimise => v.min(),
        Aspect::Maximise => v.max(),
        Aspect::Average => v.average(level),
        Aspect::Extremify => v.extreme(),
        Aspect::Randomise => {
            v.base + damroll(v.dice, v.sides, rng) + magnitude_bonus(v.m_bonus, level, rng)
        }
    }
}

/// Level-scaled enchantment-style bonus in `0..=max`.
///
/// Drawn from a normal distribution whose mean moves from zero towards `max`
/// as `level` approaches [MAX_LEVEL] and whose standard deviation is a
/// quarter of `max`, so the full bonus stays possible but rare.
#[cfg(feature = "roll")]
pub fn magnitude_bonus<R: Rng>(max: i32, level: i32, rng: &mut R) -> i32 {
    let level = if level >= MAX_LEVEL {
        MAX_LEVEL - 1
    } else {
        level
    };

    let mean = rounded_division(max * level, MAX_LEVEL, rng);
    let stand = rounded_division(max, 4, rng);
    let value = normal(mean, stand, rng);

    // negative draws go to zero before the cap applies, so a negative cap
    // never comes back out
    if value < 0 {
        0
    } else if value > max {
        max
    } else {
        value
    }
}

/// Integer division that rounds up with probability proportional to the
/// remainder, so repeated calls average the exact quotient.
#[cfg(feature = "roll")]
fn rounded_division<R: Rng>(dividend: i32, divisor: i32, rng: &mut R) -> i32 {
    let quotient = dividend / divisor;
    let remainder = dividend % divisor;
    if rng.gen_range(0..divisor) < remainder {
        quotient + 1
    } else {
        quotient
    }
}

/// Normal-distribution draw around `mean`, via binary search of a cumulative
/// table with standard deviation [NORMAL_TABLE_STD].
#[cfg(feature = "roll")]
fn normal<R: Rng>(mean: i32, stand: i32, rng: &mut R) -> i32 {
    if stand < 1 {
        return mean;
    }

    let roll: i32 = rng.gen_range(0..32768);
    let mut low = 0;
    let mut high = NORMAL_TABLE.len();
    while low < high {
        let mid = (low + high) / 2;
        if i32::from(NORMAL_TABLE[mid]) < roll {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    let offset = stand * low as i32 / NORMAL_TABLE_STD;
    if rng.gen_range(0..2) == 0 {
        mean - offset
    } else {
        mean + offset
    }
}

/// Standard deviation encoded by [NORMAL_TABLE].
#[cfg(feature = "roll")]
const NORMAL_TABLE_STD: i32 = 64;

/// Cumulative distribution table for [normal], 256 entries over half the
/// bell curve.
#[cfg(feature = "roll")]
static NORMAL_TABLE: [i16; 256] = [
    206, 613, 1022, 1430, 1838, 2245, 2652, 3058, //
    3463, 3867, 4271, 4673, 5075, 5475, 5874, 6271, //
    6667, 7061, 7454, 7845, 8234, 8621, 9006, 9389, //
    9770, 10148, 10524, 10898, 11269, 11638, 12004, 12367, //
    12727, 13085, 13440, 13792, 14140, 14486, 14828, 15168, //
    15504, 15836, 16166, 16492, 16814, 17133, 17449, 17761, //
    18069, 18374, 18675, 18972, 19266, 19556, 19842, 20124, //
    20403, 20678, 20949, 21216, 21479, 21738, 21994, 22245, //
    22493, 22737, 22977, 23213, 23446, 23674, 23899, 24120, //
    24336, 24550, 24759, 24965, 25166, 25365, 25559, 25750, //
    25937, 26120, 26300, 26476, 26649, 26818, 26983, 27146, //
    27304, 27460, 27612, 27760, 27906, 28048, 28187, 28323, //
    28455, 28585, 28711, 28835, 28955, 29073, 29188, 29299, //
    29409, 29515, 29619, 29720, 29818, 29914, 30007, 30098, //
    30186, 30272, 30356, 30437, 30516, 30593, 30668, 30740, //
    30810, 30879, 30945, 31010, 31072, 31133, 31192, 31249, //
    31304, 31358, 31410, 31460, 31509, 31556, 31601, 31646, //
    31688, 31730, 31770, 31808, 31846, 31882, 31917, 31950, //
    31983, 32014, 32044, 32074, 32102, 32129, 32155, 32180, //
    32205, 32228, 32251, 32273, 32294, 32314, 32333, 32352, //
    32370, 32387, 32404, 32420, 32435, 32450, 32464, 32477, //
    32490, 32503, 32515, 32526, 32537, 32548, 32558, 32568, //
    32577, 32586, 32595, 32603, 32611, 32618, 32625, 32632, //
    32639, 32645, 32651, 32657, 32662, 32667, 32672, 32677, //
    32682, 32686, 32690, 32694, 32698, 32702, 32705, 32708, //
    32711, 32714, 32717, 32720, 32722, 32725, 32727, 32729, //
    32731, 32733, 32735, 32737, 32739, 32740, 32742, 32743, //
    32745, 32746, 32747, 32748, 32749, 32750, 32751, 32752, //
    32753, 32754, 32755, 32756, 32757, 32757, 32758, 32758, //
    32759, 32760, 32760, 32761, 32761, 32761, 32762, 32762, //
    32763, 32763, 32763, 32764, 32764, 32764, 32764, 32765, //
    32765, 32765, 32765, 32766, 32766, 32766, 32766, 32767, //
];

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: RandomValue = RandomValue {
        base: 1,
        dice: 2,
        sides: 3,
        m_bonus: 4,
    };

    #[test]
    fn test_bounds() {
        assert_eq!(EXAMPLE.min(), 3);
        assert_eq!(EXAMPLE.max(), 11);
        assert!(EXAMPLE.varies());
        assert!(EXAMPLE.contains(3));
        assert!(EXAMPLE.contains(11));
        assert!(!EXAMPLE.contains(2));
        assert!(!EXAMPLE.contains(12));
    }

    #[test]
    fn test_average_scales_with_level() {
        assert_eq!(EXAMPLE.average(0), 5);
        assert_eq!(EXAMPLE.average(64), 7);
        assert_eq!(EXAMPLE.average(MAX_LEVEL), 9);
    }

    #[test]
    fn test_fixed_value_does_not_vary() {
        let fixed = RandomValue {
            base: 7,
            dice: 0,
            sides: 0,
            m_bonus: 0,
        };
        assert!(!fixed.varies());
        assert_eq!(fixed.min(), 7);
        assert_eq!(fixed.max(), 7);
    }
}

#[cfg(all(test, feature = "roll"))]
mod roll_tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_damroll_floor() {
        // an all-zeroes generator makes every die show its lowest face
        let mut rng = StepRng::new(0, 0);
        assert_eq!(damroll(3, 6, &mut rng), 3);
    }

    #[test]
    fn test_damroll_degenerate_dice() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(damroll(0, 6, &mut rng), 0);
        assert_eq!(damroll(2, 0, &mut rng), 0);
        assert_eq!(damroll(-1, 6, &mut rng), 0);
    }

    #[test]
    fn test_damroll_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let sum = damroll(2, 6, &mut rng);
            assert!(sum >= 2 && sum <= 12, "2d6 rolled {}", sum);
        }
    }

    #[test]
    fn test_randcalc_deterministic_aspects() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = RandomValue {
            base: 1,
            dice: 2,
            sides: 3,
            m_bonus: 4,
        };
        assert_eq!(randcalc(v, 0, Aspect::Minimise, &mut rng), 3);
        assert_eq!(randcalc(v, 0, Aspect::Maximise, &mut rng), 11);
        assert_eq!(randcalc(v, 0, Aspect::Average, &mut rng), 5);
        assert_eq!(randcalc(v, 0, Aspect::Extremify, &mut rng), 11);
    }

    #[test]
    fn test_extremify_prefers_larger_magnitude() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = RandomValue {
            base: -20,
            dice: 1,
            sides: 3,
            m_bonus: 0,
        };
        assert_eq!(randcalc(v, 0, Aspect::Extremify, &mut rng), -19);
    }

    #[test]
    fn test_randomise_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = RandomValue {
            base: 1,
            dice: 2,
            sides: 3,
            m_bonus: 4,
        };
        for _ in 0..200 {
            let result = randcalc(v, 50, Aspect::Randomise, &mut rng);
            assert!(v.contains(result), "rolled {} outside {:?}", result, v);
        }
    }

    #[test]
    fn test_magnitude_bonus_negative_cap_yields_zero() {
        // mean and deviation both come out negative, so every draw is
        // negative and zeroed; the negative cap must never leak through
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(magnitude_bonus(-5, 64, &mut rng), 0);
        }
    }

    #[test]
    fn test_magnitude_bonus_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for level in &[0, 1, 64, 127, 128, 1000] {
            for _ in 0..100 {
                let bonus = magnitude_bonus(10, *level, &mut rng);
                assert!((0..=10).contains(&bonus), "bonus {} at level {}", bonus, level);
            }
        }
    }
}
