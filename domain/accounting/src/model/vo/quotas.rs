use std::iter::Sum;
use std::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Resource usage in minute-equivalents plus a monetary deposit.
///
/// Values are never mutated in place; `+` yields a new value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    pub cpu: u64,
    pub gpu: u64,
    /// Memory in bytes multiplied by minutes.
    pub ram: u64,
    pub deposit: Decimal,
}

impl Quotas {
    pub const ZERO: Quotas = Quotas {
        cpu: 0,
        gpu: 0,
        ram: 0,
        deposit: Decimal::ZERO,
    };

    pub fn new(cpu: u64, gpu: u64, ram: u64) -> Self {
        Self {
            cpu,
            gpu,
            ram,
            deposit: Decimal::ZERO,
        }
    }

    pub fn with_deposit(self, deposit: Decimal) -> Self {
        Self { deposit, ..self }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Add for Quotas {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            cpu: self.cpu.saturating_add(rhs.cpu),
            gpu: self.gpu.saturating_add(rhs.gpu),
            ram: self.ram.saturating_add(rhs.ram),
            deposit: self.deposit + rhs.deposit,
        }
    }
}

impl Add<&Quotas> for Quotas {
    type Output = Self;

    fn add(self, rhs: &Quotas) -> Self::Output {
        self + *rhs
    }
}

impl Sum for Quotas {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Quotas::ZERO, |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quotas> for Quotas {
    fn sum<I: Iterator<Item = &'a Quotas>>(iter: I) -> Self {
        iter.fold(Quotas::ZERO, |acc, q| acc + q)
    }
}
