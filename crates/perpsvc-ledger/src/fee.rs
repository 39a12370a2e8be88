//! Fee safety margin and max-withdraw convergence.
//!
//! The network fee for a transfer is tiny and stable, but the wallet keeps
//! a buffer so a withdrawal never strands the account below rent or fails
//! on a fee bump between estimate and send.

/// Minimum fee buffer in lamports.
pub const MIN_SAFE_FEE: u64 = 500_000;
/// Flat buffer added on top of the raw fee.
pub const FLAT_FEE_BUFFER: u64 = 300_000;
/// Multiplier applied to the raw fee.
pub const FEE_MULTIPLIER: u64 = 5;
/// Lamports always left behind in the account.
pub const RESERVE_LAMPORTS: u64 = 600_000;
/// Convergence threshold in lamports.
pub const CONVERGENCE_EPSILON: u64 = 1_000;
/// Maximum refinement steps.
pub const MAX_ITERATIONS: u32 = 4;
/// Fallback when the network returns no fee.
pub const DEFAULT_FEE_LAMPORTS: u64 = 5_000;
/// Buffer the withdraw endpoint keeps below the balance.
pub const WITHDRAW_FEE_BUFFER: u64 = 5_000;

/// `max(5*raw, raw + 300_000, 500_000)`.
pub fn safe_fee(raw: u64) -> u64 {
    raw.saturating_mul(FEE_MULTIPLIER)
        .max(raw.saturating_add(FLAT_FEE_BUFFER))
        .max(MIN_SAFE_FEE)
}

/// Result of the convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxWithdraw {
    pub max_lamports: u64,
    /// Raw fee observed on the last step.
    pub fee_lamports: u64,
    pub safe_fee_lamports: u64,
    pub iterations: u32,
}

/// Step-driven max-withdraw search.
///
/// Start at `balance - MIN_SAFE_FEE - RESERVE`; each step takes the raw fee
/// for the current amount and recomputes `balance - safe_fee - RESERVE`.
/// Terminates when the amount moves by less than `CONVERGENCE_EPSILON` or
/// after `MAX_ITERATIONS` steps, whichever comes first.
#[derive(Debug, Clone)]
pub struct FeeConvergence {
    balance: u64,
    amount: u64,
    fee: u64,
    iterations: u32,
    done: bool,
}

impl FeeConvergence {
    pub fn new(balance: u64) -> Self {
        Self {
            balance,
            amount: balance.saturating_sub(MIN_SAFE_FEE + RESERVE_LAMPORTS),
            fee: DEFAULT_FEE_LAMPORTS,
            iterations: 0,
            done: false,
        }
    }

    /// Amount whose fee should be queried next.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed the raw fee for `amount()`. Returns true once converged.
    pub fn step(&mut self, raw_fee: u64) -> bool {
        if self.done {
            return true;
        }
        self.fee = raw_fee;
        self.iterations += 1;

        let next = self
            .balance
            .saturating_sub(safe_fee(raw_fee))
            .saturating_sub(RESERVE_LAMPORTS);
        let delta = next.abs_diff(self.amount);
        self.amount = next;

        self.done = delta < CONVERGENCE_EPSILON || self.iterations >= MAX_ITERATIONS;
        self.done
    }

    pub fn result(&self) -> MaxWithdraw {
        MaxWithdraw {
            max_lamports: self.amount,
            fee_lamports: self.fee,
            safe_fee_lamports: safe_fee(self.fee),
            iterations: self.iterations,
        }
    }

    /// Run to completion with a synchronous fee function.
    pub fn run(balance: u64, mut fee_for: impl FnMut(u64) -> u64) -> MaxWithdraw {
        let mut conv = Self::new(balance);
        while !conv.step(fee_for(conv.amount())) {}
        conv.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_fee_branches() {
        assert_eq!(safe_fee(0), 500_000);
        assert_eq!(safe_fee(5_000), 500_000);
        assert_eq!(safe_fee(100_000), 500_000);
        assert_eq!(safe_fee(200_000), 1_000_000);
        assert_eq!(safe_fee(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_constant_fee_converges_in_one_step() {
        let res = FeeConvergence::run(1_000_000_000, |_| 5_000);
        assert_eq!(res.iterations, 1);
        assert_eq!(res.max_lamports, 1_000_000_000 - 500_000 - 600_000);
        assert_eq!(res.safe_fee_lamports, 500_000);
    }

    #[test]
    fn test_bounded_iterations() {
        // a fee that keeps moving never converges but still terminates
        let mut calls = 0u64;
        let res = FeeConvergence::run(10_000_000_000, |_| {
            calls += 1;
            1_000_000 * calls * calls
        });
        assert_eq!(res.iterations, MAX_ITERATIONS);
        assert_eq!(calls, MAX_ITERATIONS as u64);
    }

    #[test]
    fn test_small_balance_floors_at_zero() {
        let res = FeeConvergence::run(700_000, |_| 5_000);
        assert_eq!(res.max_lamports, 0);
    }

    #[test]
    fn test_step_after_done_is_noop() {
        let mut conv = FeeConvergence::new(5_000_000);
        assert!(conv.step(5_000));
        let before = conv.result();
        assert!(conv.step(999_999));
        assert_eq!(conv.result(), before);
    }
}
