//! Deliberate misbehavior, used to exercise the complaint and justification paths of peers.
//!
//! Every [Fault] is checked at a single point of the protocol and triggers with the probability
//! configured for it. All rates default to zero. A rate of zero never consumes randomness, so an
//! honest session draws exactly the same random values whether or not faults are configured.

use crate::Error;
use rand::Rng;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// A way in which a member can misbehave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fault {
    /// Do not send a contribution.
    ContributionOmit,
    /// Deal a random (unverifiable) share to every other member.
    ContributionLie,
    /// Complain about a member whose share decrypted fine.
    ComplainLie,
    /// Reveal a random share in a justification.
    JustifyLie,
    /// Do not send a justification.
    JustifyOmit,
    /// Do not send a premature commitment.
    CommitOmit,
    /// Corrupt one field of the premature commitment.
    CommitLie,
}

impl Fault {
    /// Every fault.
    pub const ALL: [Fault; 7] = [
        Fault::ContributionOmit,
        Fault::ContributionLie,
        Fault::ComplainLie,
        Fault::JustifyLie,
        Fault::JustifyOmit,
        Fault::CommitOmit,
        Fault::CommitLie,
    ];

    /// Returns the configuration name of the fault.
    pub fn name(&self) -> &'static str {
        match self {
            Fault::ContributionOmit => "contribution-omit",
            Fault::ContributionLie => "contribution-lie",
            Fault::ComplainLie => "complain-lie",
            Fault::JustifyLie => "justify-lie",
            Fault::JustifyOmit => "justify-omit",
            Fault::CommitOmit => "commit-omit",
            Fault::CommitLie => "commit-lie",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Fault {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fault::ALL
            .into_iter()
            .find(|fault| fault.name() == s)
            .ok_or_else(|| Error::UnknownFault(s.to_string()))
    }
}

/// Probability with which each fault triggers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Faults {
    rates: BTreeMap<Fault, f64>,
}

impl Faults {
    /// Sets the probability (clamped to `[0, 1]`) with which `fault` triggers.
    pub fn set(&mut self, fault: Fault, rate: f64) {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        if rate == 0.0 {
            self.rates.remove(&fault);
        } else {
            self.rates.insert(fault, rate);
        }
    }

    /// Returns a copy with `fault` set to `rate`.
    pub fn with(mut self, fault: Fault, rate: f64) -> Self {
        self.set(fault, rate);
        self
    }

    /// Returns the probability with which `fault` triggers.
    pub fn rate(&self, fault: Fault) -> f64 {
        self.rates.get(&fault).copied().unwrap_or(0.0)
    }

    /// Returns true if no fault can trigger.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Draws whether `fault` triggers now.
    pub fn should<R: Rng>(&self, fault: Fault, rng: &mut R) -> bool {
        match self.rates.get(&fault) {
            Some(rate) => rng.gen_bool(*rate),
            None => false,
        }
    }
}

/// Parses a comma-separated list of `name=rate` pairs (e.g. `commit-omit=1,justify-lie=0.5`).
impl FromStr for Faults {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut faults = Faults::default();
        for pair in s.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (name, rate) = pair
                .split_once('=')
                .ok_or_else(|| Error::InvalidFaultRate(pair.to_string()))?;
            let fault = name.trim().parse::<Fault>()?;
            let rate = rate
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|rate| (0.0..=1.0).contains(rate))
                .ok_or_else(|| Error::InvalidFaultRate(pair.to_string()))?;
            faults.set(fault, rate);
        }
        Ok(faults)
    }
}
