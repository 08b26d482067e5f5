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

//! Parser and evaluator for `base+XdYMz` dice formulas.
//!
//! A formula such as `"1+2d3M4"` has four components: a flat base, a dice
//! count, a number of sides and a magnitude bonus. Any component can instead
//! be a `$NAME` variable bound to a prefix-notation [Expression], which is
//! re-evaluated on every use:
//!
//! ```
//! use dice_formula::{Dice, Expression};
//!
//! let mut dice: Dice = "$LVL+2d3".parse().unwrap();
//!
//! let mut level = Expression::new();
//! level.set_base_value(|| 3);
//! level.add_operations_string("* 3 - 1").unwrap();
//!
//! dice.bind_expression("LVL", &level).unwrap();
//!
//! let value = dice.random_value();
//! assert_eq!((value.base, value.dice, value.sides), (8, 2, 3));
//! assert_eq!(value.min(), 10);
//! assert_eq!(value.max(), 14);
//! ```
//!
//! With the default `roll` feature the formula collapses to a number, either
//! by plain rolling or under an [Aspect] policy (minimum, maximum, level
//! scaled average, extreme or random), always through a caller supplied
//! [rand::Rng]:
//!
//! ```
//! use dice_formula::{Aspect, Dice};
//! use rand::thread_rng;
//!
//! let dice: Dice = "1+2d3M4".parse().unwrap();
//! let (result, _) = dice.evaluate(0, Aspect::Maximise, &mut thread_rng());
//! assert_eq!(result, 11);
//!
//! let (rolled, _) = dice.roll(&mut thread_rng());
//! assert!((3..=7).contains(&rolled));
//! ```

pub mod dice;
pub mod expression;
pub mod random;

pub use dice::{Dice, DiceError};
pub use expression::{BaseValue, Expression, ExpressionError};
#[cfg(feature = "roll")]
pub use random::{damroll, randcalc};
pub use random::{Aspect, RandomValue, MAX_LEVEL};
