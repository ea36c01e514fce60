//! 17.14 signed fixed-point arithmetic for the MLFQS load average and
//! per-thread recent CPU usage.
//!
//! The format mirrors `include/threads/fixed-point.h` from the reference
//! scheduler this subsystem is modeled on: 17 integer bits, 14 fractional
//! bits, stored in a plain `i32`.

/// Scale factor: 1.0 in fixed-point representation.
const F: i32 = 1 << 14;

/// A 17.14 fixed-point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fp(i32);

impl Fp {
    pub const ZERO: Fp = Fp(0);

    /// Converts an integer to fixed-point.
    pub fn from_int(n: i32) -> Fp {
        Fp(n * F)
    }

    /// Truncates toward zero.
    pub fn to_int_trunc(self) -> i32 {
        self.0 / F
    }

    /// Rounds to the nearest integer, away from zero on ties.
    pub fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    pub fn add(self, other: Fp) -> Fp {
        Fp(self.0 + other.0)
    }

    pub fn sub(self, other: Fp) -> Fp {
        Fp(self.0 - other.0)
    }

    pub fn add_int(self, n: i32) -> Fp {
        Fp(self.0 + n * F)
    }

    pub fn sub_int(self, n: i32) -> Fp {
        Fp(self.0 - n * F)
    }

    pub fn mul(self, other: Fp) -> Fp {
        Fp(((self.0 as i64) * (other.0 as i64) / F as i64) as i32)
    }

    pub fn mul_int(self, n: i32) -> Fp {
        Fp(self.0 * n)
    }

    pub fn div(self, other: Fp) -> Fp {
        Fp((((self.0 as i64) * F as i64) / other.0 as i64) as i32)
    }

    pub fn div_int(self, n: i32) -> Fp {
        Fp(self.0 / n)
    }
}
