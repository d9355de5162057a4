//! Counts primes in a range by trial division.

/// Number of primes in `[start, end]`.
pub fn count_primes(start: u64, end: u64) -> u64 {
    (start.max(2)..=end).filter(|&n| is_prime(n)).count() as u64
}

pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    // Every prime above 3 is 6k +/- 1.
    let mut i = 5u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_primes() {
        let primes: Vec<u64> = (0..30).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(is_prime(7919));
        assert!(!is_prime(7917));
        assert!(!is_prime(25));
        assert!(!is_prime(49));
    }

    #[test]
    fn known_prime_counts() {
        assert_eq!(count_primes(1, 30), 10);
        assert_eq!(count_primes(1, 10000), 1229);
        assert_eq!(count_primes(1, 25000), 2762);
    }

    #[test]
    fn ranges_are_additive() {
        let whole = count_primes(1, 25000);
        let parts =
            count_primes(1, 10000) + count_primes(10001, 20000) + count_primes(20001, 25000);
        assert_eq!(whole, parts);
    }

    #[test]
    fn empty_and_degenerate_ranges() {
        assert_eq!(count_primes(0, 1), 0);
        assert_eq!(count_primes(10, 9), 0);
        assert_eq!(count_primes(2, 2), 1);
    }
}
