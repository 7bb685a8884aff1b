pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const POW_DEFAULT_DIFFICULTY: usize = 4;
pub const GENESIS_PROOF: u64 = 100;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const MINING_PACE_MS: u64 = 15;

pub const MSG_TRYING: &str = "Trying next proof...";
pub const MSG_FOUND: &str = "Valid proof found!";
pub const MSG_SEALED: &str = "Block mined and added to chain.";
