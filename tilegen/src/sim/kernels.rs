// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Reference implementations of the built-in kernels.
//!
//! Each kernel processes exactly one block: one slice per input kind and one
//! output slice, all sized by the design's [`KindPlan`](crate::plan::KindPlan)s.

use crate::gen_error;
use crate::types::GenResult;

/// Bits per bitmap word.
const WORD_BITS: usize = 64;

const ODD_BITS: u64 = 0xAAAA_AAAA_AAAA_AAAA;

/// Bytes marked by the structural character index.
const STRUCTURAL: [u8; 6] = [b'{', b'}', b'[', b']', b':', b','];

/// Run kernel `name` on one block.
///
/// `block_size` is the trailing block-size argument of kernels that take one.
pub fn invoke(
    name: &str,
    inputs: &[&[u8]],
    output: &mut [u8],
    block_size: Option<u64>,
) -> GenResult<()> {
    match name {
        "structural_character_index" => {
            let n = block_arg(name, block_size)?;
            let [data] = single_input(name, inputs)?;
            check_len(name, "input", data.len(), n)?;
            check_len(name, "output", output.len(), n / 8)?;
            structural_character_index(data, output);
            Ok(())
        }
        "string_index" => {
            let n = block_arg(name, block_size)?;
            let [string] = single_input(name, inputs)?;
            check_len(name, "input", string.len(), 2 * (n / 8) + 4)?;
            check_len(name, "output", output.len(), n / 8)?;
            string_index(string, output, n);
            Ok(())
        }
        "vector_scalar_add" => {
            let [words] = single_input(name, inputs)?;
            check_len(name, "output", output.len(), words.len())?;
            map_words(words, output, |w| w.wrapping_add(1));
            Ok(())
        }
        "vector_scalar_mul" => {
            let [words] = single_input(name, inputs)?;
            check_len(name, "output", output.len(), words.len())?;
            map_words(words, output, |w| w.wrapping_mul(3));
            Ok(())
        }
        _ => gen_error!(Simulation, "No reference implementation of kernel '{name}'"),
    }
}

fn block_arg(name: &str, block_size: Option<u64>) -> GenResult<usize> {
    match block_size {
        Some(n) if n as usize % WORD_BITS == 0 => Ok(n as usize),
        Some(n) => gen_error!(
            Simulation,
            "{name}: block size {n} is not a multiple of {WORD_BITS}"
        ),
        None => gen_error!(Simulation, "{name}: requires a block size argument"),
    }
}

fn single_input<'a>(name: &str, inputs: &[&'a [u8]]) -> GenResult<[&'a [u8]; 1]> {
    match inputs {
        [input] => Ok([*input]),
        _ => gen_error!(
            Simulation,
            "{name}: expected 1 input, given {}",
            inputs.len()
        ),
    }
}

fn check_len(name: &str, what: &str, actual: usize, expected: usize) -> GenResult<()> {
    if actual == expected {
        Ok(())
    } else {
        gen_error!(
            Simulation,
            "{name}: {what} block is {actual} bytes, expected {expected}"
        )
    }
}

fn read_word(bytes: &[u8], index: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[index * 8..index * 8 + 8]);
    u64::from_le_bytes(word)
}

fn write_word(bytes: &mut [u8], index: usize, value: u64) {
    bytes[index * 8..index * 8 + 8].copy_from_slice(&value.to_le_bytes());
}

/// One bit per byte, set for `{}[]:,`.
pub fn structural_character_index(data: &[u8], index: &mut [u8]) {
    for (w, chunk) in data.chunks_exact(WORD_BITS).enumerate() {
        let bits = chunk
            .iter()
            .enumerate()
            .filter(|(_, b)| STRUCTURAL.contains(*b))
            .fold(0u64, |acc, (i, _)| acc | (1 << i));
        write_word(index, w, bits);
    }
}

/// Carry-less prefix sum: bit `i` is the parity of bits `0..=i`.
#[must_use]
pub fn prefix_xor(mut bits: u64) -> u64 {
    bits ^= bits << 1;
    bits ^= bits << 2;
    bits ^= bits << 4;
    bits ^= bits << 8;
    bits ^= bits << 16;
    bits ^= bits << 32;
    bits
}

/// One bit per byte, set for bytes inside a string.
///
/// `input` holds the quote bitmap, the backslash bitmap and a `u32` escape
/// carry for a block of `n` bytes. Quotes preceded by an odd run of
/// backslashes do not open or close a string. String state starts outside a
/// string at every block.
pub fn string_index(input: &[u8], index: &mut [u8], n: usize) {
    let bitmap_size = n / 8;
    let quotes = &input[..bitmap_size];
    let backslashes = &input[bitmap_size..2 * bitmap_size];
    let mut carry = [0u8; 4];
    carry.copy_from_slice(&input[2 * bitmap_size..2 * bitmap_size + 4]);

    let mut prev_in_string = 0u64;
    let mut prev_is_escaped = u64::from(u32::from_le_bytes(carry));

    for w in 0..n / WORD_BITS {
        let quote = read_word(quotes, w);
        let backslash = read_word(backslashes, w);

        let potential_escape = backslash & !prev_is_escaped;
        let maybe_escaped = potential_escape << 1;
        let even_series = (maybe_escaped | ODD_BITS).wrapping_sub(potential_escape);
        let escape_and_terminal = even_series ^ ODD_BITS;
        let escaped = escape_and_terminal ^ (backslash | prev_is_escaped);
        let escape = escape_and_terminal & backslash;
        prev_is_escaped = escape >> 63;

        let mut in_string = prefix_xor(quote & !escaped);
        in_string ^= prev_in_string;
        prev_in_string = ((in_string as i64) >> 63) as u64;

        write_word(index, w, in_string);
    }
}

fn map_words(input: &[u8], output: &mut [u8], f: impl Fn(i32) -> i32) {
    for (src, dst) in input.chunks_exact(4).zip(output.chunks_exact_mut(4)) {
        let value = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        dst.copy_from_slice(&f(value).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::host::string_block;

    fn bitmap_bits(index: &[u8]) -> Vec<usize> {
        (0..index.len() * 8)
            .filter(|i| index[i / 8] & (1 << (i % 8)) != 0)
            .collect()
    }

    #[test]
    fn structural_characters() {
        let mut data = vec![b' '; 64];
        data[..13].copy_from_slice(br#"{"a":[1,2]} x"#);
        let mut index = vec![0; 8];
        structural_character_index(&data, &mut index);
        assert_eq!(bitmap_bits(&index), vec![0, 4, 5, 7, 9, 10]);
    }

    #[test]
    fn strings_respect_escapes() {
        let mut data = vec![b' '; 64];
        let text = br#"{"a\"b":1}"#;
        data[..text.len()].copy_from_slice(text);

        let input = string_block(&data, false);
        let mut index = vec![0; 8];
        string_index(&input, &mut index, 64);

        // Open quote at 1, escaped quote at 4, close quote at 6.
        assert_eq!(bitmap_bits(&index), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn carry_escapes_first_quote() {
        let data = br#"\"abc"#.repeat(16);
        let input = string_block(&data[..64], false);
        let mut carried = input.clone();
        carried[16] = 1;

        let mut plain = vec![0; 8];
        let mut escaped = vec![0; 8];
        string_index(&input, &mut plain, 64);
        string_index(&carried, &mut escaped, 64);

        // A carried escape turns the leading backslash into an escaped
        // character, releasing the quote after it.
        assert_ne!(plain, escaped);
    }

    #[test]
    fn prefix_xor_parity() {
        assert_eq!(prefix_xor(0b1001), 0b0111);
        assert_eq!(prefix_xor(1), u64::MAX);
    }

    #[test]
    fn vector_kernels() {
        let input: Vec<u8> = [1i32, -1, i32::MAX]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut output = vec![0; input.len()];
        invoke("vector_scalar_add", &[&input], &mut output, None).unwrap();
        assert_eq!(&output[..4], &2i32.to_le_bytes());
        assert_eq!(&output[4..8], &0i32.to_le_bytes());
        assert_eq!(&output[8..], &i32::MIN.to_le_bytes());

        invoke("vector_scalar_mul", &[&input], &mut output, None).unwrap();
        assert_eq!(&output[..4], &3i32.to_le_bytes());
    }

    #[test]
    #[should_panic(expected = "No reference implementation of kernel 'fft'")]
    fn unknown_kernel() {
        invoke("fft", &[], &mut [], None).unwrap();
    }
}
