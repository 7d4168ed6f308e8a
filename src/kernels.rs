//! Computation kernels executed during the busy phase of a duty cycle.
//!
//! Every kernel runs its algorithm repeatedly until the monotonic clock
//! reaches the given deadline. Deadline checks are coarse: the series kernel
//! checks once per iteration batch and the Fibonacci kernel only between full
//! recursive calls, so a small overshoot past the deadline is expected and
//! tolerated by the worker loop.

use std::fmt;
use std::hint::black_box;
use std::str::FromStr;
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Selectable computation routine. Global to the pool, one active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ComputeKernel {
    BusyWait = 0,
    Pi = 1,
    Primes = 2,
    Matrix = 3,
    Fibonacci = 4,
}

impl ComputeKernel {
    /// All kernels, in wire-name order.
    pub const ALL: [ComputeKernel; 5] = [
        ComputeKernel::BusyWait,
        ComputeKernel::Pi,
        ComputeKernel::Primes,
        ComputeKernel::Matrix,
        ComputeKernel::Fibonacci,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeKernel::BusyWait => "busy-wait",
            ComputeKernel::Pi => "pi",
            ComputeKernel::Primes => "primes",
            ComputeKernel::Matrix => "matrix",
            ComputeKernel::Fibonacci => "fibonacci",
        }
    }

    /// Decodes the atomic representation shared with workers. Values only
    /// ever come from `as u8` on a valid variant.
    pub(crate) fn from_u8(raw: u8) -> ComputeKernel {
        match raw {
            1 => ComputeKernel::Pi,
            2 => ComputeKernel::Primes,
            3 => ComputeKernel::Matrix,
            4 => ComputeKernel::Fibonacci,
            _ => ComputeKernel::BusyWait,
        }
    }
}

impl fmt::Display for ComputeKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeKernel {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "busy-wait" => Ok(ComputeKernel::BusyWait),
            "pi" => Ok(ComputeKernel::Pi),
            "primes" => Ok(ComputeKernel::Primes),
            "matrix" => Ok(ComputeKernel::Matrix),
            "fibonacci" => Ok(ComputeKernel::Fibonacci),
            other => {
                let available: Vec<&str> =
                    ComputeKernel::ALL.iter().map(|k| k.as_str()).collect();
                Err(LoadError::InvalidArgument(format!(
                    "invalid computation type '{}', available: {}",
                    other,
                    available.join(", ")
                )))
            }
        }
    }
}

/// Runs the selected kernel until `deadline`.
pub fn run(kernel: ComputeKernel, deadline: Instant) {
    match kernel {
        ComputeKernel::BusyWait => busy_wait(deadline),
        ComputeKernel::Pi => pi_series(deadline),
        ComputeKernel::Primes => find_primes(deadline),
        ComputeKernel::Matrix => matrix_multiply(deadline),
        ComputeKernel::Fibonacci => fibonacci(deadline),
    }
}

/// Tight loop checking the clock. Baseline kernel with near-zero
/// per-iteration overhead.
fn busy_wait(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// Leibniz series for pi. The deadline is checked once per 100-term batch,
/// trading a little overscan for fewer clock reads.
fn pi_series(deadline: Instant) {
    let mut pi = 0.0f64;
    let mut i = 0u64;

    while Instant::now() < deadline {
        for _ in 0..100 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            pi += sign / (2 * i + 1) as f64;
            i += 1;
        }
        black_box(pi);
    }
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut i = 3u64;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Trial division over an increasing candidate range; found primes are
/// discarded. The range wraps so candidates stay cheap enough for the
/// per-candidate deadline check to matter.
fn find_primes(deadline: Instant) {
    let mut n = 1_000u64;

    while Instant::now() < deadline {
        black_box(is_prime(n));
        n += 1;
        if n > 100_000 {
            n = 1_000;
        }
    }
}

/// Repeated 4x4 multiplies over freshly randomized matrices, results
/// discarded. Deadline checked once per multiply.
fn matrix_multiply(deadline: Instant) {
    let mut rng = rand::rng();

    while Instant::now() < deadline {
        let a: [[f64; 4]; 4] = std::array::from_fn(|_| std::array::from_fn(|_| rng.random()));
        let b: [[f64; 4]; 4] = std::array::from_fn(|_| std::array::from_fn(|_| rng.random()));
        let mut out = [[0.0f64; 4]; 4];

        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                for k in 0..4 {
                    *cell += a[i][k] * b[k][j];
                }
            }
        }
        black_box(out);
    }
}

fn fib(n: u32) -> u64 {
    if n < 2 {
        n as u64
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

// Argument range for the recursive kernel. fib(30) keeps a single call in the
// low-millisecond range, bounding the overshoot past the deadline.
const FIB_MIN: u32 = 25;
const FIB_MAX: u32 = 30;

/// Naive doubly-recursive Fibonacci with an increasing argument. The deadline
/// is only checked between full calls, so one call may overrun it slightly.
fn fibonacci(deadline: Instant) {
    let mut n = FIB_MIN;

    while Instant::now() < deadline {
        black_box(fib(n));
        n += 1;
        if n > FIB_MAX {
            n = FIB_MIN;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn kernel_names_round_trip() {
        for kernel in ComputeKernel::ALL {
            assert_eq!(kernel.as_str().parse::<ComputeKernel>().unwrap(), kernel);
        }
    }

    #[test]
    fn kernel_name_parsing_is_case_insensitive() {
        assert_eq!(
            "PRIMES".parse::<ComputeKernel>().unwrap(),
            ComputeKernel::Primes
        );
        assert_eq!(
            "  Busy-Wait ".parse::<ComputeKernel>().unwrap(),
            ComputeKernel::BusyWait
        );
    }

    #[test]
    fn unknown_kernel_name_is_invalid_argument() {
        let err = "bogus".parse::<ComputeKernel>().unwrap_err();
        assert!(matches!(err, LoadError::InvalidArgument(_)));
        assert!(err.to_string().contains("fibonacci"));
    }

    #[test]
    fn atomic_encoding_round_trips() {
        for kernel in ComputeKernel::ALL {
            assert_eq!(ComputeKernel::from_u8(kernel as u8), kernel);
        }
    }

    #[test]
    fn trial_division_classifies_correctly() {
        assert!(is_prime(2));
        assert!(is_prime(3));
        assert!(is_prime(97));
        assert!(is_prime(7919));
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(!is_prime(1_000));
        assert!(!is_prime(99_999));
    }

    #[test]
    fn naive_fibonacci_matches_known_terms() {
        assert_eq!(fib(0), 0);
        assert_eq!(fib(1), 1);
        assert_eq!(fib(10), 55);
        assert_eq!(fib(20), 6_765);
    }

    // Each kernel must run at least until the deadline. The upper bound is
    // loose: coarse deadline checks make small overshoot part of the
    // contract, and CI machines are slow.
    #[test]
    fn kernels_run_until_deadline() {
        for kernel in ComputeKernel::ALL {
            let budget = Duration::from_millis(20);
            let start = Instant::now();
            run(kernel, start + budget);
            let elapsed = start.elapsed();
            assert!(
                elapsed >= budget,
                "{} returned after {:?}, before its {:?} deadline",
                kernel,
                elapsed,
                budget
            );
            assert!(
                elapsed < budget + Duration::from_secs(1),
                "{} overshot its deadline by {:?}",
                kernel,
                elapsed - budget
            );
        }
    }
}
