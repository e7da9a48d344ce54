//! Polynomial operations over the BLS12-381 scalar field.
//!
//! Quorum members are evaluated at their member id (a scalar derived from their identity
//! hash), so evaluation and interpolation take arbitrary field points.
//!
//! # Warning
//!
//! The security of the polynomial operations is critical for the overall
//! security of the threshold schemes. Ensure that the scalar field operations
//! are performed over the correct field and that all elements are valid.

use crate::bls12381::primitives::{
    group::{self, Element, Scalar},
    Error,
};
use bytes::{Buf, BufMut};
use llmq_codec::{
    types::{len_size, read_len, write_len},
    EncodeSize, Error as CodecError, Read, ReadExt, Write,
};
use rand::RngCore;
use zeroize::Zeroize;

/// Private polynomials are used to generate secret shares.
pub type Private = Poly<group::Private>;

/// Public polynomials (verification vectors) commit to the coefficients of a private polynomial.
pub type Public = Poly<group::Public>;

/// A polynomial that is using a scalar for the variable x and a generic
/// element for the coefficients.
///
/// The coefficients must be able to multiply the type of the variable,
/// which is always a scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
// Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L24-L28
pub struct Poly<C>(Vec<C>);

/// Returns a new scalar polynomial of the given degree where each coefficient is
/// sampled at random from the provided RNG.
///
/// In the context of secret sharing, the threshold is the degree + 1.
pub fn new_from<R: RngCore>(degree: u32, rng: &mut R) -> Poly<Scalar> {
    // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L46-L52
    let coeffs = (0..=degree).map(|_| Scalar::rand(rng)).collect::<Vec<_>>();
    Poly::<Scalar>(coeffs)
}

impl<C> Poly<C> {
    /// Creates a new polynomial from the given coefficients.
    pub fn from(c: Vec<C>) -> Self {
        Self(c)
    }

    /// Returns the constant term of the polynomial.
    ///
    /// Panics if the polynomial has no coefficients.
    pub fn constant(&self) -> &C {
        &self.0[0]
    }

    /// Returns the number of coefficients (the threshold of the sharing).
    pub fn required(&self) -> usize {
        self.0.len()
    }

    /// Returns the coefficients.
    pub fn coefficients(&self) -> &[C] {
        &self.0
    }
}

impl<C: Element> Poly<C> {
    /// Commits the scalar polynomial to the group and returns a polynomial over
    /// the group.
    ///
    /// This is done by multiplying each coefficient of the polynomial with the
    /// group's generator.
    pub fn commit(commits: &Poly<Scalar>) -> Self {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L322-L340
        let commits = commits
            .0
            .iter()
            .map(|c| {
                let mut commitment = C::one();
                commitment.mul(c);
                commitment
            })
            .collect::<Vec<C>>();

        Poly::<C>::from(commits)
    }

    /// Performs polynomial addition in place.
    pub fn add(&mut self, other: &Self) {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L87-L95

        // if we have a smaller degree we should pad with zeros
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), C::zero())
        }

        self.0.iter_mut().zip(&other.0).for_each(|(a, b)| a.add(b))
    }

    /// Evaluates the polynomial at the member id `x`.
    pub fn evaluate(&self, x: &Scalar) -> C {
        // Use Horner's method to evaluate the polynomial
        self.0.iter().rev().fold(C::zero(), |mut sum, coeff| {
            sum.mul(x);
            sum.add(coeff);
            sum
        })
    }

    /// Recovers the constant term of a polynomial of degree less than `t` from the first
    /// `t` of the provided `(member id, evaluation)` pairs.
    ///
    /// This function uses Lagrange interpolation at `x=0`. Callers must supply the pairs in a
    /// deterministic order so that two invocations select the same evaluations.
    ///
    /// # Warning
    ///
    /// Duplicate (or zero) member ids fail with an error when attempting to compute the
    /// inverse of zero.
    pub fn recover<'a, I>(t: usize, evals: I) -> Result<C, Error>
    where
        C: 'a,
        I: IntoIterator<Item = (&'a Scalar, &'a C)>,
    {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L131-L165
        let xs = evals.into_iter().take(t).collect::<Vec<_>>();
        if xs.len() < t {
            return Err(Error::NotEnoughPartialSignatures(t, xs.len()));
        }

        // The constant term is `sum_{i=1 to t} yi * l_i(0)`, where `l_i(0) = product_{j != i} (xj / (xj - xi))`.
        xs.iter()
            .enumerate()
            .try_fold(C::zero(), |mut acc, (i, (xi, yi))| {
                if xi.is_zero() {
                    return Err(Error::NoInverse);
                }
                let (mut num, den) = xs.iter().enumerate().fold(
                    (Scalar::one(), Scalar::one()),
                    |(mut num, mut den), (j, (xj, _))| {
                        if i != j {
                            num.mul(xj);
                            let mut tmp = **xj;
                            tmp.sub(xi);
                            den.mul(&tmp);
                        }
                        (num, den)
                    },
                );

                // Fails if den is zero (duplicate ids)
                let inv = den.inverse().ok_or(Error::NoInverse)?;
                num.mul(&inv);

                let mut yi_scaled = **yi;
                yi_scaled.mul(&num);
                acc.add(&yi_scaled);
                Ok(acc)
            })
    }
}

impl Poly<Scalar> {
    /// Overwrites every coefficient with zero.
    pub fn clear(&mut self) {
        self.0.iter_mut().for_each(Zeroize::zeroize);
    }
}

impl<C: Element> Write for Poly<C> {
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.0.len(), buf);
        for c in &self.0 {
            c.write(buf);
        }
    }
}

impl<C: Element> EncodeSize for Poly<C> {
    fn encode_size(&self) -> usize {
        len_size(self.0.len()) + C::SIZE * self.0.len()
    }
}

/// Polynomials are read with the maximum number of coefficients accepted.
impl<C: Element> Read for Poly<C> {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        let len = read_len(buf, *max)?;
        if len == 0 {
            return Err(CodecError::Invalid("Poly", "no coefficients"));
        }
        if buf.remaining() < C::SIZE * len {
            return Err(CodecError::EndOfBuffer);
        }
        let mut coeffs = Vec::with_capacity(len);
        for _ in 0..len {
            coeffs.push(C::read(buf)?);
        }
        Ok(Self(coeffs))
    }
}

/// Returns the public key of the polynomial (constant term).
pub fn public(public: &Public) -> &group::Public {
    public.constant()
}
