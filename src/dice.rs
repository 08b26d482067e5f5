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

//! The `base+XdYMz` dice formula object.
//!
//! A [Dice] is parsed once from text like `"1+2d3M4"` and evaluated many
//! times. Each of its four components (base, dice count, sides, magnitude
//! bonus) is either a literal integer or a `$NAME` variable; variables are
//! bound to [Expression]s after parsing, so the same formula text can be
//! reused across entities with different dynamic inputs.
//!
//! The grammar, informally: `[BASE] ['+'] [DICE] 'd' SIDES ['M' BONUS]`,
//! every part optional. `"1+2d3M4"`, `"d3"`, `"M4"`, `"1"`, `"$A+$Bd$C"`
//! and a lone `"-"` are all valid; see the tests for the full accept and
//! reject sets. Whitespace is ignored outright and never ends a token, so
//! `" 1 1 + 2 d 3 "` reads as `"11+2d3"`.

use crate::expression::Expression;
use crate::random::RandomValue;
#[cfg(feature = "roll")]
use crate::random::{damroll, randcalc, Aspect};
#[cfg(feature = "logging")]
use log::debug;
#[cfg(feature = "roll")]
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Hard limit on distinct variables per formula. Four components can name at
/// most four.
const MAX_VARIABLES: usize = 4;

/// Longest token (number or variable name) kept while scanning; further
/// characters are dropped, not rejected.
const TOKEN_SIZE: usize = 16;

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum DiceError {
    #[error("unexpected character {found:?} at byte {position}")]
    UnexpectedCharacter { position: usize, found: char },
    #[error("formula ended in the middle of a component")]
    UnexpectedEnd,
    #[error("more than 4 distinct variables in one formula")]
    TooManyVariables,
    #[error("no variable named {0:?} in this formula")]
    UnknownVariable(String),
}

/// One formula component: a literal value or an index into the variable
/// table.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Component {
    Literal(i32),
    Variable(usize),
}

impl Default for Component {
    fn default() -> Self {
        Component::Literal(0)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
struct Variable {
    name: String,
    expression: Option<Expression>,
}

/// Scanner states. The `Flush*` states commit the accumulated token to a
/// component; reaching end of input anywhere else is a parse failure.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Start,
    BaseDigit,
    FlushBase,
    DiceDigit,
    FlushDice,
    SideDigit,
    FlushSide,
    Bonus,
    BonusDigit,
    FlushBonus,
    Var,
    VarChar,
    FlushAll,
}

/// Character classes driving the state table.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Input {
    Amp,
    Minus,
    Plus,
    Dice,
    Bonus,
    Var,
    Digit,
    Upper,
    End,
}

/// The transition table. Entries absent here are invalid transitions.
fn transition(state: State, input: Input) -> Option<State> {
    use Input::*;
    Some(match (state, input) {
        (State::Start, Minus) | (State::Start, Digit) => State::BaseDigit,
        (State::Start, Dice) => State::FlushDice,
        (State::Start, Bonus) => State::Bonus,
        (State::Start, Var) => State::Var,

        (State::BaseDigit, Plus) | (State::BaseDigit, End) => State::FlushBase,
        (State::BaseDigit, Dice) => State::FlushDice,
        (State::BaseDigit, Digit) => State::BaseDigit,

        (State::FlushBase, Dice) => State::FlushDice,
        (State::FlushBase, Bonus) => State::Bonus,
        (State::FlushBase, Var) => State::Var,
        (State::FlushBase, Digit) => State::DiceDigit,

        (State::DiceDigit, Dice) => State::FlushDice,
        (State::DiceDigit, Digit) => State::DiceDigit,

        (State::FlushDice, Var) => State::Var,
        (State::FlushDice, Digit) => State::SideDigit,

        (State::SideDigit, Amp) | (State::SideDigit, End) => State::FlushSide,
        (State::SideDigit, Bonus) => State::Bonus,
        (State::SideDigit, Digit) => State::SideDigit,

        (State::FlushSide, Bonus) => State::Bonus,

        (State::Bonus, Var) => State::Var,
        (State::Bonus, Digit) => State::BonusDigit,

        (State::BonusDigit, Digit) => State::BonusDigit,
        (State::BonusDigit, End) => State::FlushBonus,

        (State::Var, Upper) => State::VarChar,

        (State::VarChar, Amp) => State::FlushSide,
        (State::VarChar, Plus) => State::FlushBase,
        (State::VarChar, Dice) => State::FlushDice,
        (State::VarChar, Bonus) => State::Bonus,
        (State::VarChar, Upper) => State::VarChar,
        (State::VarChar, End) => State::FlushAll,

        _ => return None,
    })
}

/// Which component the scanner saw last; flushed tokens land one past it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Seen {
    Nothing,
    Base,
    Dice,
    Side,
    Bonus,
}

impl Seen {
    fn next(self) -> Self {
        match self {
            Seen::Nothing => Seen::Base,
            Seen::Base => Seen::Dice,
            Seen::Dice => Seen::Side,
            Seen::Side | Seen::Bonus => Seen::Bonus,
        }
    }
}

/// A parsed dice formula. Reusable: every parse fully resets the object,
/// including variable bindings.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Dice {
    base: Component,
    dice: Component,
    sides: Component,
    m_bonus: Component,
    variables: Vec<Variable>,
}

impl Dice {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.base = Component::default();
        self.dice = Component::default();
        self.sides = Component::default();
        self.m_bonus = Component::default();
        self.variables.clear();
    }

    /// Register a variable name, reusing the slot if the name was already
    /// seen in this formula.
    fn add_variable(&mut self, name: &str) -> Result<usize, DiceError> {
        if let Some(index) = self
            .variables
            .iter()
            .position(|variable| variable.name.eq_ignore_ascii_case(name))
        {
            return Ok(index);
        }
        if self.variables.len() >= MAX_VARIABLES {
            return Err(DiceError::TooManyVariables);
        }
        self.variables.push(Variable {
            name: name.to_owned(),
            expression: None,
        });
        Ok(self.variables.len() - 1)
    }

    /// Parse a formula string into this object, replacing whatever it held.
    ///
    /// The scanner walks the string character by character through the state
    /// table, accumulating digit/name tokens and committing them whenever a
    /// flush state is entered. Subtleties worth knowing:
    ///
    /// - spaces are skipped outright, concatenating whatever surrounds them;
    /// - `M` is a name character inside a `$`-variable and the bonus marker
    ///   everywhere else (`m` is always the marker);
    /// - `d` with no count before it means one die;
    /// - a lone leading `-` commits a zero base;
    /// - tokens longer than 16 characters are truncated, not rejected.
    ///
    /// On failure the object's contents are unspecified, but a later parse
    /// starts from a clean slate regardless.
    pub fn parse_string(&mut self, input: &str) -> Result<(), DiceError> {
        self.reset();

        let mut token = String::new();
        let mut state = State::Start;
        let mut last_seen = Seen::Nothing;

        let characters = input
            .char_indices()
            .map(|(position, c)| (position, Some(c)))
            .chain(std::iter::once((input.len(), None)));

        for (position, c) in characters {
            if let Some(ch) = c {
                if ch.is_ascii_whitespace() {
                    continue;
                }
            }

            let input_class = match c {
                None => Input::End,
                Some('&') => Input::Amp,
                Some('-') => Input::Minus,
                Some('+') => Input::Plus,
                Some('d') => Input::Dice,
                // inside a variable name, 'M' is just another letter
                Some('M') if state == State::Var || state == State::VarChar => Input::Upper,
                Some('m') | Some('M') => Input::Bonus,
                Some('$') => Input::Var,
                Some(ch) if ch.is_ascii_digit() => Input::Digit,
                Some(ch) if ch.is_ascii_uppercase() => Input::Upper,
                Some(ch) => {
                    return Err(DiceError::UnexpectedCharacter {
                        position,
                        found: ch,
                    })
                }
            };

            if let Some(ch) = c {
                if matches!(input_class, Input::Minus | Input::Digit | Input::Upper)
                    && token.len() < TOKEN_SIZE
                {
                    token.push(ch);
                }
            }

            state = match transition(state, input_class) {
                Some(next) => next,
                None => {
                    return Err(match c {
                        Some(ch) => DiceError::UnexpectedCharacter {
                            position,
                            found: ch,
                        },
                        None => DiceError::UnexpectedEnd,
                    })
                }
            };

            let flush = match state {
                State::FlushBase => {
                    last_seen = Seen::Base;
                    true
                }
                State::FlushDice => {
                    last_seen = Seen::Dice;
                    // a 'd' with no count before it means one die
                    if token.is_empty() {
                        token.push('1');
                    }
                    true
                }
                State::FlushSide => {
                    last_seen = Seen::Side;
                    true
                }
                State::FlushBonus => {
                    last_seen = Seen::Bonus;
                    true
                }
                State::FlushAll => {
                    last_seen = last_seen.next();
                    true
                }
                State::Bonus => {
                    // the bonus marker directly after sides digits closes the
                    // sides component
                    last_seen = if last_seen == Seen::Dice {
                        Seen::Side
                    } else {
                        Seen::Bonus
                    };
                    true
                }
                _ => false,
            };

            if flush && !token.is_empty() {
                let component = if token.starts_with(|ch: char| ch.is_ascii_uppercase()) {
                    Component::Variable(self.add_variable(&token)?)
                } else {
                    // a lone "-" reads as zero
                    Component::Literal(token.parse::<i64>().unwrap_or(0) as i32)
                };

                match last_seen {
                    Seen::Base => self.base = component,
                    Seen::Dice => self.dice = component,
                    Seen::Side => self.sides = component,
                    Seen::Bonus => self.m_bonus = component,
                    Seen::Nothing => {}
                }

                token.clear();
            }
        }

        #[cfg(feature = "logging")]
        debug!("parsed dice formula {:?} as {}", input, self);

        Ok(())
    }

    /// Bind an expression to a variable name seen during parsing. The dice
    /// object stores its own copy; rebinding a name replaces the old one.
    /// Returns the slot index.
    pub fn bind_expression(
        &mut self,
        name: &str,
        expression: &Expression,
    ) -> Result<usize, DiceError> {
        let found = self
            .variables
            .iter_mut()
            .enumerate()
            .find(|(_, variable)| variable.name.eq_ignore_ascii_case(name));

        match found {
            Some((index, variable)) => {
                variable.expression = Some(expression.clone());
                #[cfg(feature = "logging")]
                debug!("bound expression to {:?} in slot {}", name, index);
                Ok(index)
            }
            None => Err(DiceError::UnknownVariable(name.to_owned())),
        }
    }

    fn resolve(&self, component: Component) -> i32 {
        match component {
            Component::Literal(value) => value,
            // a registered but never-bound variable evaluates to zero
            Component::Variable(index) => self
                .variables
                .get(index)
                .and_then(|variable| variable.expression.as_ref())
                .map_or(0, Expression::evaluate),
        }
    }

    /// Resolve all four components for one evaluation pass, evaluating any
    /// bound expressions.
    pub fn random_value(&self) -> RandomValue {
        RandomValue {
            base: self.resolve(self.base),
            dice: self.resolve(self.dice),
            sides: self.resolve(self.sides),
            m_bonus: self.resolve(self.m_bonus),
        }
    }

    /// Fully evaluate the formula under an aspect policy, returning the
    /// collapsed result together with the resolved components it came from.
    #[cfg(feature = "roll")]
    pub fn evaluate<R: Rng>(&self, level: i32, aspect: Aspect, rng: &mut R) -> (i32, RandomValue) {
        let value = self.random_value();
        let result = randcalc(value, level, aspect, rng);
        #[cfg(feature = "logging")]
        debug!("{} evaluated to {} under {:?}", self, result, aspect);
        (result, value)
    }

    /// Roll the formula: base plus the summed dice. The magnitude bonus is
    /// resolved and reported but not added; its meaning belongs to the
    /// caller.
    #[cfg(feature = "roll")]
    pub fn roll<R: Rng>(&self, rng: &mut R) -> (i32, RandomValue) {
        let value = self.random_value();
        let result = value.base + damroll(value.dice, value.sides, rng);
        #[cfg(feature = "logging")]
        debug!("{} rolled {} from {:?}", self, result, value);
        (result, value)
    }

    /// Whether all four components are these exact literals.
    pub fn has_values(&self, base: i32, dice: i32, sides: i32, m_bonus: i32) -> bool {
        self.base == Component::Literal(base)
            && self.dice == Component::Literal(dice)
            && self.sides == Component::Literal(sides)
            && self.m_bonus == Component::Literal(m_bonus)
    }

    /// Whether each component is a variable with the given name (`Some`) or
    /// not a variable at all (`None`). Names compare case-insensitively.
    pub fn has_variables(
        &self,
        base: Option<&str>,
        dice: Option<&str>,
        sides: Option<&str>,
        m_bonus: Option<&str>,
    ) -> bool {
        self.component_matches(self.base, base)
            && self.component_matches(self.dice, dice)
            && self.component_matches(self.sides, sides)
            && self.component_matches(self.m_bonus, m_bonus)
    }

    fn component_matches(&self, component: Component, expected: Option<&str>) -> bool {
        match (component, expected) {
            (Component::Variable(index), Some(name)) => self
                .variables
                .get(index)
                .map_or(false, |variable| variable.name.eq_ignore_ascii_case(name)),
            (Component::Literal(_), None) => true,
            _ => false,
        }
    }

    fn fmt_component(&self, f: &mut fmt::Formatter<'_>, component: Component) -> fmt::Result {
        match component {
            Component::Literal(value) => write!(f, "{}", value),
            Component::Variable(index) => match self.variables.get(index) {
                Some(variable) => write!(f, "${}", variable.name),
                None => write!(f, "$?"),
            },
        }
    }
}

impl fmt::Display for Dice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;

        if self.base != Component::Literal(0) {
            self.fmt_component(f, self.base)?;
            wrote = true;
        }

        if self.dice != Component::Literal(0) || self.sides != Component::Literal(0) {
            if wrote {
                write!(f, "+")?;
            }
            self.fmt_component(f, self.dice)?;
            write!(f, "d")?;
            self.fmt_component(f, self.sides)?;
            wrote = true;
        }

        if self.m_bonus != Component::Literal(0) {
            write!(f, "M")?;
            self.fmt_component(f, self.m_bonus)?;
            wrote = true;
        }

        if !wrote {
            write!(f, "0")?;
        }
        Ok(())
    }
}

impl FromStr for Dice {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut dice = Dice::new();
        dice.parse_string(s)?;
        Ok(dice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &str) -> Dice {
        let mut dice = Dice::new();
        dice.parse_string(input)
            .unwrap_or_else(|err| panic!("{:?} failed to parse: {}", input, err));
        dice
    }

    #[test]
    fn test_literal_round_trip() {
        let cases: &[(&str, (i32, i32, i32, i32))] = &[
            ("1+2d3M4", (1, 2, 3, 4)),
            ("1+d3M4", (1, 1, 3, 4)),
            ("1+M4", (1, 0, 0, 4)),
            ("1+2d3", (1, 2, 3, 0)),
            ("1+d3", (1, 1, 3, 0)),
            ("2d3M4", (0, 2, 3, 4)),
            ("d3M4", (0, 1, 3, 4)),
            ("M4", (0, 0, 0, 4)),
            ("m4", (0, 0, 0, 4)),
            ("2d3", (0, 2, 3, 0)),
            ("d3", (0, 1, 3, 0)),
            ("1", (1, 0, 0, 0)),
            ("-", (0, 0, 0, 0)),
            ("-5", (-5, 0, 0, 0)),
            ("-5+2d3M4", (-5, 2, 3, 4)),
            ("11+22d33M44", (11, 22, 33, 44)),
        ];
        for (input, (base, dice, sides, m_bonus)) in cases {
            let d = parsed(input);
            assert!(
                d.has_values(*base, *dice, *sides, *m_bonus),
                "{:?} parsed as {:?}",
                input,
                d
            );
        }
    }

    #[test]
    fn test_whitespace_never_splits_tokens() {
        assert_eq!(parsed(" 1 + 2 d 3 M 4 "), parsed("1+2d3M4"));
        assert!(parsed("1 1+2d3M4").has_values(11, 2, 3, 4));
        assert!(parsed("- 5").has_values(-5, 0, 0, 0));
    }

    #[test]
    fn test_ampersand_is_inert() {
        assert!(parsed("2d3&M4").has_values(0, 2, 3, 4));
    }

    #[test]
    fn test_rejects() {
        let rejects = [
            "",
            "1+-2d3M4",
            "1+2d-3M4",
            "1+2d3M-4",
            "$base+2d3",
            "1+",
            "1+2",
            "1+d",
            "1+2d",
            "1+2d3M",
            "+2d3",
            "--",
            "1z2",
            "$",
            "2d3&",
            // uppercase M after a variable extends the name, so the '$'
            // that follows has nowhere to go; lowercase m works there
            "$A+$Bd$CM$D",
        ];
        for input in &rejects {
            let mut dice = Dice::new();
            assert!(
                dice.parse_string(input).is_err(),
                "{:?} should not parse",
                input
            );
        }
    }

    #[test]
    fn test_variable_round_trip() {
        let d = parsed("$A+$Bd$Cm$D");
        assert!(d.has_variables(Some("A"), Some("B"), Some("C"), Some("D")));

        let partial = parsed("$A+2d3");
        assert!(partial.has_variables(Some("A"), None, None, None));

        let lone = parsed("$POWER");
        assert!(lone.has_variables(Some("POWER"), None, None, None));
    }

    #[test]
    fn test_all_literal_formula_has_no_variables() {
        assert!(parsed("1+2d3M4").has_variables(None, None, None, None));
        assert!(!parsed("1+2d3M4").has_variables(Some("A"), None, None, None));
    }

    #[test]
    fn test_variable_name_may_contain_m() {
        let d = parsed("$DAM+2d3");
        assert!(d.has_variables(Some("DAM"), None, None, None));
    }

    #[test]
    fn test_variable_dedup_shares_slot() {
        let mut d = parsed("$X+$Xd$X");
        assert!(d.has_variables(Some("X"), Some("X"), Some("X"), None));

        let mut two = Expression::new();
        two.add_operations_string("+ 2").unwrap();
        assert_eq!(d.bind_expression("X", &two), Ok(0));
        assert_eq!(
            d.random_value(),
            RandomValue {
                base: 2,
                dice: 2,
                sides: 2,
                m_bonus: 0
            }
        );
    }

    #[test]
    fn test_long_variable_name_truncates() {
        let d = parsed("$ABCDEFGHIJKLMNOPQR");
        assert!(d.has_variables(Some("ABCDEFGHIJKLMNOP"), None, None, None));
    }

    #[test]
    fn test_unbound_variable_resolves_to_zero() {
        let d = parsed("$A+2d3");
        assert_eq!(
            d.random_value(),
            RandomValue {
                base: 0,
                dice: 2,
                sides: 3,
                m_bonus: 0
            }
        );
    }

    #[test]
    fn test_bind_unknown_name_fails() {
        let mut d = parsed("$A+2d3");
        let expression = Expression::new();
        assert_eq!(
            d.bind_expression("B", &expression),
            Err(DiceError::UnknownVariable("B".to_owned()))
        );
    }

    #[test]
    fn test_reparse_resets_everything() {
        let mut d = parsed("$A+2d3");
        let mut expression = Expression::new();
        expression.add_operations_string("+ 9").unwrap();
        d.bind_expression("A", &expression).unwrap();

        d.parse_string("5+1d6").unwrap();
        assert!(d.has_values(5, 1, 6, 0));
        assert!(d.has_variables(None, None, None, None));
        assert_eq!(d.random_value().base, 5);
        assert_eq!(d.bind_expression("A", &expression), Err(DiceError::UnknownVariable("A".to_owned())));
    }

    #[test]
    fn test_parse_recovers_after_failure() {
        let mut d = Dice::new();
        assert!(d.parse_string("1+2d3M").is_err());
        d.parse_string("2d3").unwrap();
        assert!(d.has_values(0, 2, 3, 0));
    }

    #[test]
    fn test_from_str_and_display() {
        let cases = ["1+2d3M4", "2d3", "M4", "-5", "$A+2d3"];
        for input in &cases {
            let d: Dice = input.parse().unwrap();
            assert_eq!(d.to_string(), *input, "display of {:?}", input);
        }
        assert_eq!(parsed("d3").to_string(), "1d3");
        assert_eq!(parsed("-").to_string(), "0");
    }
}

#[cfg(all(test, feature = "roll"))]
mod roll_tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_bound_expression_drives_evaluation() {
        let mut power = Expression::new();
        power.set_base_value(|| 3);
        power.add_operations_string("* 3 - 1").unwrap();

        let mut d = Dice::new();
        d.parse_string("$A + 2d3").unwrap();
        d.bind_expression("A", &power).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let (result, value) = d.evaluate(0, Aspect::Maximise, &mut rng);
        assert_eq!(result, 14);
        assert_eq!(
            value,
            RandomValue {
                base: 8,
                dice: 2,
                sides: 3,
                m_bonus: 0
            }
        );
    }

    #[test]
    fn test_rebinding_replaces_expression() {
        let mut d = Dice::new();
        d.parse_string("$A").unwrap();

        let mut first = Expression::new();
        first.add_operations_string("+ 1").unwrap();
        let mut second = Expression::new();
        second.add_operations_string("+ 2").unwrap();

        d.bind_expression("A", &first).unwrap();
        d.bind_expression("A", &second).unwrap();
        assert_eq!(d.random_value().base, 2);
    }

    #[test]
    fn test_roll_omits_magnitude_bonus() {
        let d: Dice = "1+2d3M4".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let (result, value) = d.roll(&mut rng);
            assert!(result >= 3 && result <= 7, "rolled {}", result);
            assert_eq!(value.m_bonus, 4);
        }
    }

    #[test]
    fn test_evaluate_aspects_on_literals() {
        let d: Dice = "1+2d3M4".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(d.evaluate(0, Aspect::Minimise, &mut rng).0, 3);
        assert_eq!(d.evaluate(0, Aspect::Maximise, &mut rng).0, 11);
        assert_eq!(d.evaluate(0, Aspect::Average, &mut rng).0, 5);
    }
}
