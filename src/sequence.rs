use rand::Rng;
use serde::{Deserialize, Serialize};

const DIGITS: [char; 9] = ['1', '2', '3', '4', '5', '6', '7', '8', '9'];
const LETTERS: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Symbol sets the tests draw stimuli from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Alphabet {
    /// Digits 1 through 9 (no zero).
    Digits,
    /// Uppercase letters A through Z.
    Letters,
}

impl Alphabet {
    pub fn symbols(&self) -> &'static [char] {
        match self {
            Alphabet::Digits => &DIGITS,
            Alphabet::Letters => &LETTERS,
        }
    }
}

/// Generates `length` symbols from `alphabet` using the thread RNG.
pub fn generate(length: usize, alphabet: Alphabet) -> Vec<char> {
    generate_with(&mut rand::thread_rng(), length, alphabet)
}

/// Generates `length` symbols drawn uniformly from `alphabet`, redrawing any
/// symbol equal to the one before it.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, length: usize, alphabet: Alphabet) -> Vec<char> {
    let symbols = alphabet.symbols();
    let mut sequence: Vec<char> = Vec::with_capacity(length);

    while sequence.len() < length {
        let candidate = symbols[rng.gen_range(0..symbols.len())];
        if sequence.last() != Some(&candidate) {
            sequence.push(candidate);
        }
    }

    sequence
}

/// Pluggable stimulus source so hosts and tests can fix the sequence.
pub type StimulusSource = Box<dyn FnMut(usize, Alphabet) -> Vec<char> + Send>;

pub(crate) fn random_source() -> StimulusSource {
    Box::new(generate)
}
