//! Calldata decoder for the router ABIs in scope (§4.9): v2
//! `swapExactTokensForTokens`/`swapExactTokensForETH`, v3
//! `exactInputSingle`/`exactInput`. Selector dispatch first, full ABI
//! decode only on a match — unknown selectors never pay a decode cost.

use super::types::DecodedSwap;
use crate::contracts::{IUniswapV2Router02, ISwapRouter};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use tracing::trace;

const EXACT_INPUT_SINGLE: [u8; 4] = [0x41, 0x4b, 0xf3, 0x89];
const EXACT_INPUT: [u8; 4] = [0xc0, 0x4b, 0x8d, 0x59];
const SWAP_EXACT_TOKENS_FOR_TOKENS: [u8; 4] = [0x38, 0xed, 0x17, 0x39];
const SWAP_EXACT_TOKENS_FOR_ETH: [u8; 4] = [0x18, 0xcb, 0xaf, 0xe5];

pub fn decode_calldata(input: &[u8]) -> Option<DecodedSwap> {
    if input.len() < 4 {
        return None;
    }
    let selector: [u8; 4] = input[..4].try_into().ok()?;

    match selector {
        EXACT_INPUT_SINGLE => decode_v3_exact_input_single(input),
        EXACT_INPUT => decode_v3_exact_input(input),
        SWAP_EXACT_TOKENS_FOR_TOKENS => decode_v2_swap_exact_in(input, "swapExactTokensForTokens"),
        SWAP_EXACT_TOKENS_FOR_ETH => decode_v2_swap_exact_in(input, "swapExactTokensForETH"),
        _ => {
            trace!(selector = %selector_hex(input), "unrecognized router selector");
            None
        }
    }
}

pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x????".to_string();
    }
    format!("0x{:02x}{:02x}{:02x}{:02x}", input[0], input[1], input[2], input[3])
}

fn decode_v3_exact_input_single(input: &[u8]) -> Option<DecodedSwap> {
    let call = ISwapRouter::exactInputSingleCall::abi_decode(input).ok()?;
    let p = call.params;
    Some(DecodedSwap {
        function_name: "exactInputSingle".to_string(),
        token_in: Some(p.tokenIn),
        token_out: Some(p.tokenOut),
        fee_tier: Some(p.fee.to::<u32>()),
        amount_in: Some(p.amountIn),
        amount_out_min: Some(p.amountOutMinimum),
    })
}

/// `exactInput(ExactInputParams)`: the swap path is packed as
/// `token(20) | fee(3) | token(20) [| fee(3) | token(20) ...]`. We only
/// care about the first and last hop.
fn decode_v3_exact_input(input: &[u8]) -> Option<DecodedSwap> {
    // Hand-decoded rather than through the sol! binding: `ExactInputParams`
    // isn't declared in contracts.rs since nothing else needs it, and the
    // only field this decoder reads is the packed path.
    if input.len() < 4 + 32 {
        return None;
    }
    let data = &input[4..];
    let path_offset = u64::from_be_bytes(data[24..32].try_into().ok()?) as usize;
    if data.len() < path_offset + 32 {
        return None;
    }
    let path_len = u64::from_be_bytes(data[path_offset + 24..path_offset + 32].try_into().ok()?) as usize;
    let path_start = path_offset + 32;
    if data.len() < path_start + path_len {
        return None;
    }
    let path = &data[path_start..path_start + path_len];
    let (token_in, token_out, fee) = decode_v3_path(path)?;

    // amountIn / amountOutMinimum are the 4th and 5th static words.
    let amount_in = alloy::primitives::U256::from_be_slice(data.get(96..128)?);
    let amount_out_min = alloy::primitives::U256::from_be_slice(data.get(128..160)?);

    Some(DecodedSwap {
        function_name: "exactInput".to_string(),
        token_in: Some(token_in),
        token_out: Some(token_out),
        fee_tier: Some(fee),
        amount_in: Some(amount_in),
        amount_out_min: Some(amount_out_min),
    })
}

fn decode_v3_path(path: &[u8]) -> Option<(Address, Address, u32)> {
    if path.len() < 43 {
        return None;
    }
    let token_in = Address::from_slice(&path[0..20]);
    let fee = u32::from_be_bytes([0, path[20], path[21], path[22]]);
    let last_hop_start = path.len() - 20;
    let token_out = Address::from_slice(&path[last_hop_start..last_hop_start + 20]);
    Some((token_in, token_out, fee))
}

fn decode_v2_swap_exact_in(input: &[u8], fn_name: &str) -> Option<DecodedSwap> {
    let call = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(input).ok()?;
    let (token_in, token_out) = (call.path.first().copied(), call.path.last().copied());

    Some(DecodedSwap {
        function_name: fn_name.to_string(),
        token_in,
        token_out,
        fee_tier: None,
        amount_in: Some(call.amountIn),
        amount_out_min: Some(call.amountOutMin),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;

    #[test]
    fn decodes_exact_input_single() {
        let params = ISwapRouter::ExactInputSingleParams {
            tokenIn: Address::with_last_byte(1),
            tokenOut: Address::with_last_byte(2),
            fee: alloy::primitives::Uint::from(3000u32),
            recipient: Address::with_last_byte(3),
            deadline: U256::from(1u64),
            amountIn: U256::from(1_000_000u64),
            amountOutMinimum: U256::from(900_000u64),
            sqrtPriceLimitX96: Default::default(),
        };
        let calldata = ISwapRouter::exactInputSingleCall { params }.abi_encode();
        let decoded = decode_calldata(&calldata).unwrap();
        assert_eq!(decoded.function_name, "exactInputSingle");
        assert_eq!(decoded.token_in, Some(Address::with_last_byte(1)));
        assert_eq!(decoded.fee_tier, Some(3000));
    }

    #[test]
    fn unknown_selector_yields_none() {
        let garbage = [0xde, 0xad, 0xbe, 0xef, 0x00];
        assert!(decode_calldata(&garbage).is_none());
    }

    #[test]
    fn too_short_input_yields_none() {
        assert!(decode_calldata(&[0x41, 0x4b]).is_none());
    }
}
