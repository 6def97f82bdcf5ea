//! Constant calculus over four-state vectors.
//!
//! Every operator takes its operands together with their signedness and an
//! optional result width. Arithmetic is carried out on arbitrary precision
//! integers; any `x`/`z` bit in an arithmetic operand makes the whole result
//! unknown. Bitwise operators work bit by bit with four-state truth tables.

use crate::logic::Logic;
use crate::logic_vec::LogicVec;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Signature shared by all two-operand constant operators.
pub type BinaryConstFn = fn(&LogicVec, &LogicVec, bool, bool, Option<u32>) -> LogicVec;

/// Signature shared by all one-operand constant operators.
pub type UnaryConstFn = fn(&LogicVec, bool, Option<u32>) -> LogicVec;

/// Converts a fully defined vector to an integer, or `None` if any bit is `x`/`z`.
pub fn to_bigint(value: &LogicVec, signed: bool) -> Option<BigInt> {
    let mut mag = BigUint::zero();
    for (i, bit) in value.iter().enumerate() {
        match bit {
            Logic::One => mag.set_bit(i as u64, true),
            Logic::Zero => {}
            _ => return None,
        }
    }
    let mut result = BigInt::from_biguint(Sign::Plus, mag);
    if signed && value.msb() == Logic::One {
        result -= BigInt::one() << value.width();
    }
    Some(result)
}

/// Converts an integer to its two's complement representation of `width` bits.
pub fn from_bigint(value: &BigInt, width: u32) -> LogicVec {
    if width == 0 {
        return LogicVec::new(0);
    }
    let modulus = BigInt::one() << width;
    let mut wrapped = value % &modulus;
    if wrapped.is_negative() {
        wrapped += &modulus;
    }
    let mag = wrapped.magnitude();
    (0..width).map(|i| Logic::from_bool(mag.bit(i as u64))).collect()
}

/// Rounds a real to the nearest integer and encodes it in `width` bits.
///
/// Non-finite values produce all-`x`.
pub fn from_real(value: f64, width: u32) -> LogicVec {
    if !value.is_finite() {
        return LogicVec::all_x(width);
    }
    let rounded = value.round();
    let negative = rounded < 0.0;
    let mut mag = BigUint::zero();
    let mut rest = rounded.abs();
    let mut bit = 0u64;
    while rest >= 1.0 && bit < 2048 {
        if rest % 2.0 >= 1.0 {
            mag.set_bit(bit, true);
        }
        rest = (rest / 2.0).floor();
        bit += 1;
    }
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    from_bigint(&BigInt::from_biguint(sign, mag), width)
}

/// Interprets a fully defined vector as a real number.
pub fn to_real(value: &LogicVec, signed: bool) -> f64 {
    to_bigint(value, signed)
        .and_then(|v| v.to_f64())
        .unwrap_or(0.0)
}

/// Truncates or extends `value` to `width`, sign-extending when `signed`.
pub fn extend_u0(value: &LogicVec, width: u32, signed: bool) -> LogicVec {
    value.resized(width, signed)
}

fn pad_to(mut value: LogicVec, width: u32) -> LogicVec {
    while value.width() < width {
        value.push(Logic::Zero);
    }
    value
}

fn bitwise(
    op: fn(Logic, Logic) -> Logic,
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_len: Option<u32>,
) -> LogicVec {
    let width = result_len.unwrap_or_else(|| a.width().max(b.width()));
    let a = extend_u0(a, width, signed_a);
    let b = extend_u0(b, width, signed_b);
    a.iter().zip(b.iter()).map(|(x, y)| op(x, y)).collect()
}

/// Bitwise negation.
pub fn const_not(a: &LogicVec, signed_a: bool, result_len: Option<u32>) -> LogicVec {
    let width = result_len.unwrap_or(a.width());
    extend_u0(a, width, signed_a).iter().map(|b| !b).collect()
}

/// Bitwise AND.
pub fn const_and(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    bitwise(|x, y| x & y, a, b, sa, sb, len)
}

/// Bitwise OR.
pub fn const_or(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    bitwise(|x, y| x | y, a, b, sa, sb, len)
}

/// Bitwise XOR.
pub fn const_xor(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    bitwise(|x, y| x ^ y, a, b, sa, sb, len)
}

/// Bitwise XNOR.
pub fn const_xnor(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    bitwise(|x, y| !(x ^ y), a, b, sa, sb, len)
}

fn reduce(initial: Logic, op: fn(Logic, Logic) -> Logic, a: &LogicVec, len: Option<u32>) -> LogicVec {
    let folded = a.iter().fold(initial, op);
    pad_to(LogicVec::filled(1, folded), len.unwrap_or(1))
}

/// AND-reduction.
pub fn const_reduce_and(a: &LogicVec, _signed: bool, len: Option<u32>) -> LogicVec {
    reduce(Logic::One, |x, y| x & y, a, len)
}

/// OR-reduction.
pub fn const_reduce_or(a: &LogicVec, _signed: bool, len: Option<u32>) -> LogicVec {
    reduce(Logic::Zero, |x, y| x | y, a, len)
}

/// XOR-reduction.
pub fn const_reduce_xor(a: &LogicVec, _signed: bool, len: Option<u32>) -> LogicVec {
    reduce(Logic::Zero, |x, y| x ^ y, a, len)
}

/// XNOR-reduction.
pub fn const_reduce_xnor(a: &LogicVec, signed: bool, len: Option<u32>) -> LogicVec {
    let mut r = const_reduce_xor(a, signed, len);
    r.set(0, !r.get(0));
    r
}

/// Boolean reduction, identical to OR-reduction.
pub fn const_reduce_bool(a: &LogicVec, signed: bool, len: Option<u32>) -> LogicVec {
    const_reduce_or(a, signed, len)
}

fn truth(value: &LogicVec, signed: bool) -> Logic {
    match to_bigint(value, signed) {
        Some(v) => Logic::from_bool(!v.is_zero()),
        None if value.as_bool() => Logic::One,
        None => Logic::X,
    }
}

/// Logical negation.
pub fn const_logic_not(a: &LogicVec, signed_a: bool, len: Option<u32>) -> LogicVec {
    pad_to(LogicVec::filled(1, !truth(a, signed_a)), len.unwrap_or(1))
}

/// Logical AND.
pub fn const_logic_and(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    pad_to(LogicVec::filled(1, truth(a, sa) & truth(b, sb)), len.unwrap_or(1))
}

/// Logical OR.
pub fn const_logic_or(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    pad_to(LogicVec::filled(1, truth(a, sa) | truth(b, sb)), len.unwrap_or(1))
}

fn shift_worker(a: &LogicVec, amount: Option<BigInt>, sign_ext: bool, vacant: Logic, len: u32) -> LogicVec {
    let Some(amount) = amount else {
        return LogicVec::all_x(len);
    };
    let width = BigInt::from(a.width());
    (0..len)
        .map(|i| {
            let pos = BigInt::from(i) + &amount;
            if pos >= width {
                if sign_ext {
                    a.msb()
                } else {
                    vacant
                }
            } else if pos.is_negative() {
                vacant
            } else {
                pos.to_u32().map_or(vacant, |p| a.get(p))
            }
        })
        .collect()
}

/// Logical shift left.
pub fn const_shl(a: &LogicVec, b: &LogicVec, sa: bool, _sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or(a.width());
    let a = extend_u0(a, len, sa);
    shift_worker(&a, to_bigint(b, false).map(|v| -v), false, Logic::Zero, len)
}

/// Logical shift right.
pub fn const_shr(a: &LogicVec, b: &LogicVec, sa: bool, _sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or(a.width());
    let a = extend_u0(a, len.max(a.width()), sa);
    shift_worker(&a, to_bigint(b, false), false, Logic::Zero, len)
}

/// Arithmetic shift left (same as logical).
pub fn const_sshl(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    const_shl(a, b, sa, sb, len)
}

/// Arithmetic shift right; replicates the sign bit for signed operands.
pub fn const_sshr(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    if !sa {
        return const_shr(a, b, sa, sb, len);
    }
    let len = len.unwrap_or(a.width());
    let a = extend_u0(a, len.max(a.width()), sa);
    shift_worker(&a, to_bigint(b, false), true, Logic::Zero, len)
}

fn shift_shiftx(a: &LogicVec, b: &LogicVec, sb: bool, len: Option<u32>, other: Logic) -> LogicVec {
    let len = len.unwrap_or(a.width());
    let Some(offset) = to_bigint(b, sb) else {
        return LogicVec::all_x(len);
    };
    let width = BigInt::from(a.width());
    (0..len)
        .map(|i| {
            let pos = BigInt::from(i) + &offset;
            if pos.is_negative() || pos >= width {
                other
            } else {
                pos.to_u32().map_or(other, |p| a.get(p))
            }
        })
        .collect()
}

/// Bidirectional shift: positive amounts shift right, negative left; vacated bits are 0.
pub fn const_shift(a: &LogicVec, b: &LogicVec, _sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    shift_shiftx(a, b, sb, len, Logic::Zero)
}

/// Like [`const_shift`] but out-of-range bits read as `x`.
pub fn const_shiftx(a: &LogicVec, b: &LogicVec, _sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    shift_shiftx(a, b, sb, len, Logic::X)
}

fn compare(
    a: &LogicVec,
    b: &LogicVec,
    sa: bool,
    sb: bool,
    len: Option<u32>,
    pred: fn(&BigInt, &BigInt) -> bool,
) -> LogicVec {
    let bit = match (to_bigint(a, sa), to_bigint(b, sb)) {
        (Some(x), Some(y)) => Logic::from_bool(pred(&x, &y)),
        _ => Logic::X,
    };
    pad_to(LogicVec::filled(1, bit), len.unwrap_or(1))
}

/// Less than.
pub fn const_lt(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    compare(a, b, sa, sb, len, |x, y| x < y)
}

/// Less than or equal.
pub fn const_le(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    compare(a, b, sa, sb, len, |x, y| x <= y)
}

/// Greater than or equal.
pub fn const_ge(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    compare(a, b, sa, sb, len, |x, y| x >= y)
}

/// Greater than.
pub fn const_gt(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    compare(a, b, sa, sb, len, |x, y| x > y)
}

/// Logical equality: `x` when undecided, `0` as soon as a defined bit differs.
pub fn const_eq(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let width = a.width().max(b.width());
    let signed = sa && sb;
    let a = extend_u0(a, width, signed);
    let b = extend_u0(b, width, signed);
    let mut status = Logic::One;
    for (x, y) in a.iter().zip(b.iter()) {
        if x.is_definite() && y.is_definite() {
            if x != y {
                status = Logic::Zero;
                break;
            }
        } else {
            status = Logic::X;
        }
    }
    pad_to(LogicVec::filled(1, status), len.unwrap_or(1))
}

/// Logical inequality.
pub fn const_ne(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let mut r = const_eq(a, b, sa, sb, len);
    r.set(0, !r.get(0));
    r
}

/// Case equality: `x` and `z` compare literally.
pub fn const_eqx(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let width = a.width().max(b.width());
    let signed = sa && sb;
    let a = extend_u0(a, width, signed);
    let b = extend_u0(b, width, signed);
    let equal = a.iter().zip(b.iter()).all(|(x, y)| x.case_eq(y));
    pad_to(LogicVec::from_bool(equal), len.unwrap_or(1))
}

/// Case inequality.
pub fn const_nex(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let mut r = const_eqx(a, b, sa, sb, len);
    r.set(0, !r.get(0));
    r
}

fn arith(
    a: &LogicVec,
    b: &LogicVec,
    sa: bool,
    sb: bool,
    len: u32,
    op: impl FnOnce(BigInt, BigInt) -> Option<BigInt>,
) -> LogicVec {
    match (to_bigint(a, sa), to_bigint(b, sb)) {
        (Some(x), Some(y)) => match op(x, y) {
            Some(r) => from_bigint(&r, len),
            None => LogicVec::all_x(len),
        },
        _ => LogicVec::all_x(len),
    }
}

/// Addition.
pub fn const_add(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or_else(|| a.width().max(b.width()));
    arith(a, b, sa, sb, len, |x, y| Some(x + y))
}

/// Subtraction.
pub fn const_sub(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or_else(|| a.width().max(b.width()));
    arith(a, b, sa, sb, len, |x, y| Some(x - y))
}

/// Multiplication.
pub fn const_mul(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or(a.width() + b.width());
    arith(a, b, sa, sb, len, |x, y| Some(x * y))
}

/// Truncating division; division by zero yields all-`x`.
pub fn const_div(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or_else(|| a.width().max(b.width()));
    arith(a, b, sa, sb, len, |x, y| (!y.is_zero()).then(|| x / y))
}

/// Remainder with the sign of the dividend; modulo zero yields all-`x`.
pub fn const_mod(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or_else(|| a.width().max(b.width()));
    arith(a, b, sa, sb, len, |x, y| (!y.is_zero()).then(|| x % y))
}

/// Exponentiation following the integer power rules for negative exponents.
pub fn const_pow(a: &LogicVec, b: &LogicVec, sa: bool, sb: bool, len: Option<u32>) -> LogicVec {
    let len = len.unwrap_or(a.width());
    arith(a, b, sa, sb, len, |x, y| {
        if y.is_negative() {
            if x.is_zero() {
                None
            } else if x.is_one() {
                Some(BigInt::one())
            } else if x == BigInt::from(-1) {
                let odd = (&y % 2u32) != BigInt::zero();
                Some(if odd { BigInt::from(-1) } else { BigInt::one() })
            } else {
                Some(BigInt::zero())
            }
        } else {
            let mut result = BigInt::one();
            let mut base = x;
            let mut exp = y.magnitude().clone();
            let modulus = BigInt::one() << len.max(1);
            while !exp.is_zero() {
                if exp.bit(0) {
                    result = (result * &base) % &modulus;
                }
                base = (&base * &base) % &modulus;
                exp >>= 1u32;
            }
            Some(result)
        }
    })
}

/// Identity, extended to the result width.
pub fn const_pos(a: &LogicVec, signed_a: bool, len: Option<u32>) -> LogicVec {
    extend_u0(a, len.unwrap_or(a.width()), signed_a)
}

/// Arithmetic negation.
pub fn const_neg(a: &LogicVec, signed_a: bool, len: Option<u32>) -> LogicVec {
    let zero = LogicVec::new(1);
    const_sub(&zero, a, true, signed_a, Some(len.unwrap_or(a.width())))
}

/// Ceiling of log2, as used by `$clog2`; `None` for undefined input.
pub fn clog2(value: &LogicVec) -> Option<u32> {
    let v = to_bigint(value, false)?;
    if v <= BigInt::one() {
        return Some(0);
    }
    let minus_one = v - BigInt::one();
    Some(minus_one.bits() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bin(s: &str) -> LogicVec {
        LogicVec::from_binary_str(s).unwrap()
    }

    fn u(v: u64, w: u32) -> LogicVec {
        LogicVec::from_u64(v, w)
    }

    #[rstest]
    #[case(5, 2, 7)]
    #[case(6, 3, 1)]
    #[case(7, 7, 6)]
    fn add_wraps_to_three_bits(#[case] a: u64, #[case] b: u64, #[case] y: u64) {
        let r = const_add(&u(a, 3), &u(b, 3), false, false, Some(3));
        assert_eq!(r, u(y, 3));
    }

    #[rstest]
    #[case("0010", "0011", true, "1111")]
    #[case("0010", "0011", false, "1111")]
    #[case("1110", "0001", true, "1101")]
    fn sub_two_complement(#[case] a: &str, #[case] b: &str, #[case] s: bool, #[case] y: &str) {
        assert_eq!(const_sub(&bin(a), &bin(b), s, s, Some(4)), bin(y));
    }

    #[test]
    fn mul_default_width_is_sum() {
        let r = const_mul(&u(7, 3), &u(7, 3), false, false, None);
        assert_eq!(r.width(), 6);
        assert_eq!(r.to_u64(), Some(49));
    }

    #[test]
    fn signed_extension_before_op() {
        // -1 (2 bits, signed) + 1 (4 bits, signed) at width 4 = 0
        let r = const_add(&bin("11"), &bin("0001"), true, true, Some(4));
        assert_eq!(r, bin("0000"));
        // unsigned: 3 + 1 = 4
        let r = const_add(&bin("11"), &bin("0001"), false, false, Some(4));
        assert_eq!(r, bin("0100"));
    }

    #[test]
    fn unknown_operand_poisons_arithmetic() {
        let r = const_add(&bin("1x"), &bin("01"), false, false, Some(2));
        assert_eq!(r, bin("xx"));
    }

    #[test]
    fn division_by_zero_is_x() {
        assert_eq!(const_div(&u(4, 3), &u(0, 3), false, false, None), bin("xxx"));
        assert_eq!(const_mod(&u(4, 3), &u(0, 3), false, false, None), bin("xxx"));
        assert_eq!(const_div(&u(7, 3), &u(2, 3), false, false, None), u(3, 3));
        assert_eq!(const_mod(&u(7, 3), &u(2, 3), false, false, None), u(1, 3));
    }

    #[test]
    fn signed_division_truncates_toward_zero() {
        let r = const_div(&LogicVec::from_i64(-7, 8), &LogicVec::from_i64(2, 8), true, true, None);
        assert_eq!(r.as_int(true), -3);
        let r = const_mod(&LogicVec::from_i64(-7, 8), &LogicVec::from_i64(2, 8), true, true, None);
        assert_eq!(r.as_int(true), -1);
    }

    #[test]
    fn power() {
        assert_eq!(const_pow(&u(2, 8), &u(5, 8), false, false, None), u(32, 8));
        assert_eq!(const_pow(&u(2, 4), &u(5, 8), false, false, None), u(0, 4));
        let neg = LogicVec::from_i64(-1, 4);
        assert_eq!(const_pow(&u(2, 4), &neg, false, true, None), u(0, 4));
        assert_eq!(const_pow(&u(0, 4), &neg, false, true, None), bin("xxxx"));
    }

    #[test]
    fn bitwise_four_state() {
        assert_eq!(const_and(&bin("1x0"), &bin("110"), false, false, None), bin("1x0"));
        assert_eq!(const_or(&bin("0x0"), &bin("010"), false, false, None), bin("010"));
        assert_eq!(const_xnor(&bin("10"), &bin("11"), false, false, None), bin("10"));
        assert_eq!(const_not(&bin("10"), false, Some(4)), bin("1101"));
        assert_eq!(const_not(&bin("10"), true, Some(4)), bin("0001"));
    }

    #[test]
    fn reductions() {
        assert_eq!(const_reduce_and(&bin("111"), false, None), bin("1"));
        assert_eq!(const_reduce_and(&bin("1x0"), false, None), bin("0"));
        assert_eq!(const_reduce_or(&bin("00x"), false, None), bin("x"));
        assert_eq!(const_reduce_xor(&bin("1101"), false, None), bin("1"));
        assert_eq!(const_reduce_xnor(&bin("1101"), false, None), bin("0"));
        assert_eq!(const_reduce_bool(&bin("0100"), false, Some(3)), bin("001"));
    }

    #[test]
    fn logic_operators() {
        assert_eq!(const_logic_not(&bin("000"), false, None), bin("1"));
        assert_eq!(const_logic_and(&bin("10"), &bin("0x"), false, false, None), bin("x"));
        assert_eq!(const_logic_or(&bin("x1"), &bin("00"), false, false, None), bin("1"));
    }

    #[test]
    fn shifts() {
        assert_eq!(const_shl(&bin("0011"), &u(1, 2), false, false, None), bin("0110"));
        assert_eq!(const_shr(&bin("1100"), &u(2, 2), false, false, None), bin("0011"));
        assert_eq!(const_sshr(&bin("1100"), &u(2, 2), true, false, None), bin("1111"));
        assert_eq!(const_sshr(&bin("1100"), &u(2, 2), false, false, None), bin("0011"));
        assert_eq!(const_shl(&bin("01"), &bin("x"), false, false, None), bin("xx"));
    }

    #[test]
    fn bidirectional_shifts() {
        let neg_one = LogicVec::from_i64(-1, 4);
        assert_eq!(const_shift(&bin("0011"), &neg_one, false, true, None), bin("0110"));
        assert_eq!(const_shiftx(&bin("1011"), &u(2, 3), false, false, None), bin("xx10"));
    }

    #[test]
    fn comparisons() {
        let m1 = LogicVec::from_i64(-1, 4);
        assert_eq!(const_lt(&m1, &u(1, 4), true, true, None), bin("1"));
        assert_eq!(const_lt(&m1, &u(1, 4), false, false, None), bin("0"));
        assert_eq!(const_ge(&u(3, 4), &u(3, 4), false, false, None), bin("1"));
        assert_eq!(const_gt(&bin("1x"), &u(0, 2), false, false, None), bin("x"));
        assert_eq!(const_le(&u(2, 4), &u(3, 2), false, false, Some(2)), bin("01"));
    }

    #[test]
    fn equality_variants() {
        assert_eq!(const_eq(&bin("1x"), &bin("0x"), false, false, None), bin("0"));
        assert_eq!(const_eq(&bin("1x"), &bin("1x"), false, false, None), bin("x"));
        assert_eq!(const_ne(&bin("10"), &bin("010"), false, false, None), bin("0"));
        assert_eq!(const_eqx(&bin("1x"), &bin("1x"), false, false, None), bin("1"));
        assert_eq!(const_nex(&bin("1x"), &bin("1z"), false, false, None), bin("1"));
    }

    #[test]
    fn negation_and_identity() {
        assert_eq!(const_neg(&u(1, 4), false, None), bin("1111"));
        assert_eq!(const_pos(&bin("10"), true, Some(4)), bin("1110"));
    }

    #[test]
    fn bigint_roundtrip_negative() {
        let v = from_bigint(&BigInt::from(-3), 5);
        assert_eq!(v, bin("11101"));
        assert_eq!(to_bigint(&v, true), Some(BigInt::from(-3)));
        assert_eq!(to_bigint(&v, false), Some(BigInt::from(29)));
        assert_eq!(to_bigint(&bin("1z"), false), None);
    }

    #[test]
    fn real_conversion_rounds() {
        assert_eq!(from_real(2.6, 4), u(3, 4));
        assert_eq!(from_real(-1.0, 4), bin("1111"));
        assert_eq!(from_real(f64::NAN, 2), bin("xx"));
        assert_eq!(to_real(&bin("1110"), true), -2.0);
    }

    #[test]
    fn clog2_values() {
        assert_eq!(clog2(&u(0, 8)), Some(0));
        assert_eq!(clog2(&u(1, 8)), Some(0));
        assert_eq!(clog2(&u(2, 8)), Some(1));
        assert_eq!(clog2(&u(5, 8)), Some(3));
        assert_eq!(clog2(&u(256, 16)), Some(8));
        assert_eq!(clog2(&bin("x1")), None);
    }
}
