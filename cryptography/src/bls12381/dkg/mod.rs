//! Cryptographic operations of a dealerless quorum DKG.
//!
//! Every member deals a random polynomial of degree `threshold - 1`, publishes its commitment
//! (the verification vector) and privately sends each member the polynomial evaluated at that
//! member's id. Once the set of valid dealers is agreed upon, a member's share of the quorum key
//! is the sum of the shares it received from valid dealers and the quorum verification vector
//! is the sum of their verification vectors.
//!
//! # Example
//!
//! ```rust
//! use llmq_cryptography::bls12381::{
//!     dkg::ops::{aggregate_secrets, aggregate_verification_vectors, generate_contributions, verify_contribution_share},
//!     primitives::{group::Scalar, ops::{compute_public, public_key_share}},
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let ids: Vec<_> = (1..=4u8).map(|i| Scalar::from_id(&[i; 32])).collect();
//!
//! // Every member deals
//! let dealings: Vec<_> = ids.iter().map(|_| generate_contributions(&mut rng, 3, &ids)).collect();
//!
//! // Member 0 checks what it received and aggregates its share
//! let received: Vec<_> = dealings.iter().map(|(_, shares)| shares[0]).collect();
//! for ((vvec, _), share) in dealings.iter().zip(&received) {
//!     assert!(verify_contribution_share(&ids[0], vvec, share));
//! }
//! let vvecs: Vec<_> = dealings.iter().map(|(vvec, _)| vvec).collect();
//! let quorum = aggregate_verification_vectors(&vvecs).unwrap();
//! let share = aggregate_secrets(&received).unwrap();
//! assert_eq!(compute_public(&share), public_key_share(&quorum, &ids[0]));
//! ```

pub mod ops;
