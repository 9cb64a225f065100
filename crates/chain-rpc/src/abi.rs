//! Calldata for the governance contract's write functions

use crate::error::RpcError;
use ethabi::{Address, ParamType, Token, Uint};
use governance_client::{CastVoteParams, CreateProposalParams};

fn vote_params() -> Vec<ParamType> {
    vec![ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Int(256),
        ParamType::Bytes,
    ])]
}

fn proposal_params() -> Vec<ParamType> {
    vec![ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::String,
        ParamType::Bytes,
        ParamType::Address,
        ParamType::Bytes,
    ])]
}

fn call(name: &str, params: &[ParamType], tokens: &[Token]) -> Vec<u8> {
    let mut data = ethabi::short_signature(name, params).to_vec();
    data.extend(ethabi::encode(tokens));
    data
}

/// `int256` word for a signed value, two's complement.
fn int_word(value: i128) -> Uint {
    let mut word = if value < 0 { [0xff; 32] } else { [0; 32] };
    word[16..].copy_from_slice(&value.to_be_bytes());
    Uint::from_big_endian(&word)
}

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(value: &str) -> Result<Address, RpcError> {
    let trimmed = value.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|_| RpcError::InvalidAddress(value.to_string()))?;
    if bytes.len() != 20 {
        return Err(RpcError::InvalidAddress(value.to_string()));
    }
    Ok(Address::from_slice(&bytes))
}

/// `castVote((uint256 proposalId, int256 weight, bytes hookData))`
pub fn encode_cast_vote(params: &CastVoteParams) -> Vec<u8> {
    let tuple = Token::Tuple(vec![
        Token::Uint(Uint::from(params.proposal_id)),
        Token::Int(int_word(params.weight)),
        Token::Bytes(params.hook_data.clone()),
    ]);
    call("castVote", &vote_params(), &[tuple])
}

/// `createProposal((uint256 startTime, uint256 votingPeriod, string uri,
/// bytes executionData, address target, bytes hookData))`
pub fn encode_create_proposal(params: &CreateProposalParams) -> Result<Vec<u8>, RpcError> {
    let tuple = Token::Tuple(vec![
        Token::Uint(Uint::from(params.start_time)),
        Token::Uint(Uint::from(params.voting_period)),
        Token::String(params.uri.clone()),
        Token::Bytes(params.execution_data.clone()),
        Token::Address(parse_address(&params.target)?),
        Token::Bytes(params.hook_data.clone()),
    ]);
    Ok(call("createProposal", &proposal_params(), &[tuple]))
}

/// `executeProposal(uint256 proposalId)`
pub fn encode_execute_proposal(proposal_id: u64) -> Vec<u8> {
    call(
        "executeProposal",
        &[ParamType::Uint(256)],
        &[Token::Uint(Uint::from(proposal_id))],
    )
}
