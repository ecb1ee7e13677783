//! Width-tracking signed integer used by the SRP key exchange
//!
//! SRP values travel on the wire at a byte length fixed by the group prime, not by
//! their natural size. `SrpInteger` carries that length around as a hex digit count
//! and propagates it through arithmetic so that `to_bytes()` produces the padded
//! encoding the accessory expects.

use std::cmp::max;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, BitXor, Div, Mul, Rem, Sub};

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};
use rand::RngCore;

use super::CryptoError;

/// Arbitrary-precision signed integer with an optional canonical hex width
#[derive(Clone)]
pub struct SrpInteger {
    value: BigInt,
    hex_width: Option<usize>,
}

impl SrpInteger {
    /// Zero without a canonical width
    #[must_use]
    pub fn zero() -> Self {
        Self {
            value: BigInt::zero(),
            hex_width: None,
        }
    }

    /// Parse a hex string, keeping its digit count as the canonical width.
    ///
    /// Whitespace is ignored and a leading `-` makes the value negative. `None` or an
    /// empty string yields zero without a width.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidHex` if the string contains non-hex characters.
    pub fn from_hex(hex: Option<&str>) -> Result<Self, CryptoError> {
        let Some(hex) = hex else {
            return Ok(Self::zero());
        };

        let cleaned: String = hex.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if cleaned.is_empty() {
            return Ok(Self::zero());
        }

        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };

        if digits.is_empty() {
            return Err(CryptoError::InvalidHex(hex.to_string()));
        }

        let magnitude = BigInt::parse_bytes(digits.as_bytes(), 16)
            .filter(|_| digits.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| CryptoError::InvalidHex(hex.to_string()))?;

        Ok(Self {
            value: if negative { -magnitude } else { magnitude },
            hex_width: Some(digits.len()),
        })
    }

    /// Parse a hex string and force the canonical width
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidHex` if the string contains non-hex characters.
    pub fn from_hex_with_width(hex: &str, width: usize) -> Result<Self, CryptoError> {
        Ok(Self::from_hex(Some(hex))?.with_hex_width(width))
    }

    /// Interpret bytes as an unsigned big-endian number, two hex digits per byte.
    ///
    /// `None` or an empty slice yields zero without a width.
    #[must_use]
    pub fn from_bytes(bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(bytes) if !bytes.is_empty() => Self {
                value: BigInt::from_bytes_be(Sign::Plus, bytes),
                hex_width: Some(bytes.len() * 2),
            },
            _ => Self::zero(),
        }
    }

    /// Random non-zero integer of exactly `bytes` bytes
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidOperation` if `bytes` is zero.
    pub fn random(bytes: usize) -> Result<Self, CryptoError> {
        if bytes == 0 {
            return Err(CryptoError::InvalidOperation(
                "random integer size must be positive".to_string(),
            ));
        }

        let mut buf = vec![0u8; bytes];
        let mut rng = rand::rngs::OsRng;
        loop {
            rng.fill_bytes(&mut buf);
            if buf.iter().any(|b| *b != 0) {
                return Ok(Self::from_bytes(Some(&buf)));
            }
        }
    }

    /// Same value with a different canonical width
    #[must_use]
    pub fn with_hex_width(mut self, width: usize) -> Self {
        self.hex_width = Some(width);
        self
    }

    /// Canonical hex width, if one has been established
    #[must_use]
    pub fn hex_width(&self) -> Option<usize> {
        self.hex_width
    }

    /// Whether the value is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Whether the value is negative
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.value.is_negative()
    }

    /// Render at the canonical width
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidOperation` when no width has been established,
    /// e.g. for the result of a multiplication.
    pub fn to_hex(&self) -> Result<String, CryptoError> {
        let width = self.hex_width.ok_or_else(|| {
            CryptoError::InvalidOperation("hex width of the integer is not defined".to_string())
        })?;
        Ok(self.to_hex_padded(width))
    }

    /// Render zero-padded to at least `width` digits, ignoring the canonical width
    #[must_use]
    pub fn to_hex_padded(&self, width: usize) -> String {
        let digits = self.value.magnitude().to_str_radix(16);
        let sign = if self.value.is_negative() { "-" } else { "" };
        format!("{sign}{digits:0>width$}")
    }

    /// Big-endian magnitude, zero-padded to the canonical byte width
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let (_, raw) = self.value.to_bytes_be();
        let raw = if self.value.is_zero() { Vec::new() } else { raw };

        let width = self.hex_width.map_or(raw.len(), |w| w.div_ceil(2));
        if raw.len() >= width {
            return if raw.is_empty() { vec![0] } else { raw };
        }

        let mut padded = vec![0u8; width - raw.len()];
        padded.extend_from_slice(&raw);
        padded
    }

    /// Big-endian magnitude padded to an explicit byte length
    #[must_use]
    pub fn to_bytes_padded(&self, len: usize) -> Vec<u8> {
        self.clone().with_hex_width(len * 2).to_bytes()
    }

    /// `self ^ exponent mod modulus`, result in `[0, modulus)` with the modulus width
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DivisionByZero` for a zero modulus.
    pub fn mod_pow(&self, exponent: &Self, modulus: &Self) -> Result<Self, CryptoError> {
        if modulus.value.is_zero() {
            return Err(CryptoError::DivisionByZero);
        }
        if exponent.value.is_negative() {
            return Err(CryptoError::InvalidOperation(
                "negative exponent in modular exponentiation".to_string(),
            ));
        }

        let m = modulus.value.abs();
        let base = floor_mod(&self.value, &m);

        Ok(Self {
            value: base.modpow(&exponent.value, &m),
            hex_width: modulus.hex_width,
        })
    }

    /// Truncating division
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DivisionByZero` for a zero divisor.
    pub fn checked_div(&self, rhs: &Self) -> Result<Self, CryptoError> {
        if rhs.value.is_zero() {
            return Err(CryptoError::DivisionByZero);
        }
        Ok(Self {
            value: &self.value / &rhs.value,
            hex_width: max_width(self.hex_width, rhs.hex_width),
        })
    }

    /// Non-negative remainder, carrying the modulus width
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DivisionByZero` for a zero modulus.
    pub fn checked_rem(&self, modulus: &Self) -> Result<Self, CryptoError> {
        if modulus.value.is_zero() {
            return Err(CryptoError::DivisionByZero);
        }
        Ok(Self {
            value: floor_mod(&self.value, &modulus.value.abs()),
            hex_width: modulus.hex_width,
        })
    }
}

fn floor_mod(value: &BigInt, modulus: &BigInt) -> BigInt {
    let r = value % modulus;
    if r.is_negative() { r + modulus } else { r }
}

fn max_width(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(max(a, b)),
        (a, b) => a.or(b),
    }
}

impl Default for SrpInteger {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<i64> for SrpInteger {
    fn from(value: i64) -> Self {
        Self {
            value: BigInt::from(value),
            hex_width: None,
        }
    }
}

impl From<u64> for SrpInteger {
    fn from(value: u64) -> Self {
        Self {
            value: BigInt::from(value),
            hex_width: None,
        }
    }
}

impl PartialEq for SrpInteger {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SrpInteger {}

impl Hash for SrpInteger {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for SrpInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.value.magnitude().to_str_radix(16);
        let sign = if self.value.is_negative() { "-" } else { "" };
        if digits.len() > 16 {
            write!(f, "<SrpInteger: {sign}{}...>", &digits[..16])
        } else {
            write!(f, "<SrpInteger: {sign}{digits}>")
        }
    }
}

impl Add for &SrpInteger {
    type Output = SrpInteger;

    fn add(self, rhs: Self) -> SrpInteger {
        SrpInteger {
            value: &self.value + &rhs.value,
            hex_width: max_width(self.hex_width, rhs.hex_width),
        }
    }
}

impl Sub for &SrpInteger {
    type Output = SrpInteger;

    fn sub(self, rhs: Self) -> SrpInteger {
        SrpInteger {
            value: &self.value - &rhs.value,
            hex_width: max_width(self.hex_width, rhs.hex_width),
        }
    }
}

impl Mul for &SrpInteger {
    type Output = SrpInteger;

    // multiplication has no meaningful wire width
    fn mul(self, rhs: Self) -> SrpInteger {
        SrpInteger {
            value: &self.value * &rhs.value,
            hex_width: None,
        }
    }
}

impl BitXor for &SrpInteger {
    type Output = SrpInteger;

    fn bitxor(self, rhs: Self) -> SrpInteger {
        SrpInteger {
            value: &self.value ^ &rhs.value,
            hex_width: max_width(self.hex_width, rhs.hex_width),
        }
    }
}

impl Div for &SrpInteger {
    type Output = SrpInteger;

    /// # Panics
    ///
    /// Panics on a zero divisor; use [`SrpInteger::checked_div`] to avoid that.
    fn div(self, rhs: Self) -> SrpInteger {
        SrpInteger {
            value: &self.value / &rhs.value,
            hex_width: max_width(self.hex_width, rhs.hex_width),
        }
    }
}

impl Rem for &SrpInteger {
    type Output = SrpInteger;

    /// # Panics
    ///
    /// Panics on a zero modulus; use [`SrpInteger::checked_rem`] to avoid that.
    fn rem(self, rhs: Self) -> SrpInteger {
        SrpInteger {
            value: floor_mod(&self.value, &rhs.value.abs()),
            hex_width: rhs.hex_width,
        }
    }
}

macro_rules! forward_owned_binop {
    ($($imp:ident :: $method:ident),*) => {
        $(
            impl $imp for SrpInteger {
                type Output = SrpInteger;

                fn $method(self, rhs: Self) -> SrpInteger {
                    (&self).$method(&rhs)
                }
            }
        )*
    };
}

forward_owned_binop!(Add::add, Sub::sub, Mul::mul, BitXor::bitxor, Div::div, Rem::rem);
