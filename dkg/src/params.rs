//! Quorum parameters.

use crate::Error;

/// Parameters of a quorum type, fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params {
    /// Tag carried by every message of a session of this type.
    pub quorum_type: u8,

    /// Maximum number of members (and the width of every bit-vector on the wire).
    pub size: usize,

    /// Minimum number of valid members (and of signers) required to form the quorum.
    pub min_size: usize,

    /// Number of shares required to recover the quorum key (degree + 1 of every polynomial).
    pub threshold: usize,

    /// Number of complaints that mark a member bad without further arbitration.
    pub bad_votes_threshold: usize,
}

impl Params {
    pub const LLMQ_50_60: Params = Params {
        quorum_type: 1,
        size: 50,
        min_size: 40,
        threshold: 30,
        bad_votes_threshold: 40,
    };

    pub const LLMQ_400_60: Params = Params {
        quorum_type: 2,
        size: 400,
        min_size: 300,
        threshold: 240,
        bad_votes_threshold: 300,
    };

    pub const LLMQ_400_85: Params = Params {
        quorum_type: 3,
        size: 400,
        min_size: 350,
        threshold: 340,
        bad_votes_threshold: 300,
    };

    /// Small quorum used to exercise the protocol locally.
    pub const LLMQ_TEST: Params = Params {
        quorum_type: 100,
        size: 5,
        min_size: 3,
        threshold: 3,
        bad_votes_threshold: 3,
    };

    /// Ensures `1 <= threshold <= min_size <= size` and `bad_votes_threshold >= 1`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.threshold == 0 {
            return Err(Error::InvalidParams("threshold must be positive"));
        }
        if self.threshold > self.min_size {
            return Err(Error::InvalidParams("threshold exceeds min size"));
        }
        if self.min_size > self.size {
            return Err(Error::InvalidParams("min size exceeds size"));
        }
        if self.bad_votes_threshold == 0 {
            return Err(Error::InvalidParams("bad votes threshold must be positive"));
        }
        if u32::try_from(self.size).is_err() {
            return Err(Error::InvalidParams("size does not fit in u32"));
        }
        Ok(())
    }
}
