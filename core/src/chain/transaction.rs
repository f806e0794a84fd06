//! # Transaction Wire Format
//!
//! Solana legacy transactions, built and signed by hand with `ed25519-dalek`
//! and `bs58` instead of pulling in the full SDK.
//!
//! ```text
//! transaction := compact(n_sigs) || sig[64] * n_sigs || message
//! message     := header[3] || compact(n_keys) || key[32] * n_keys
//!                || recent_blockhash[32] || compact(n_ix) || instruction * n_ix
//! instruction := program_index[1] || compact(n_acc) || acc_index[1] * n_acc
//!                || compact(len) || data
//! ```
//!
//! Account keys are ordered signer+writable, signer+readonly,
//! writable, readonly, with the fee payer always first. The header
//! counts let the runtime recover each key's role from its position.

use std::fmt;
use std::str::FromStr;

use crate::crypto::keys::{Pubkey, Signature, WalletKeypair};
use crate::error::{ForgeError, ForgeResult};

/// Largest serialized transaction a cluster will accept (IPv6 MTU minus headers).
pub const PACKET_DATA_SIZE: usize = 1232;

// ---------------------------------------------------------------------------
// Compact-u16
// ---------------------------------------------------------------------------

/// Append `value` as a compact-u16: 7 bits per byte, high bit = "more follows".
pub fn encode_compact_u16(value: u16, out: &mut Vec<u8>) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Decode a compact-u16 from the front of `bytes`. Returns the value and the
/// number of bytes consumed.
pub fn decode_compact_u16(bytes: &[u8]) -> ForgeResult<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            let value = u16::try_from(value)
                .map_err(|_| ForgeError::InvalidInput("compact-u16 overflow".into()))?;
            return Ok((value, i + 1));
        }
    }
    Err(ForgeError::InvalidInput("truncated compact-u16".into()))
}

fn encode_len(len: usize, out: &mut Vec<u8>) -> ForgeResult<()> {
    let len = u16::try_from(len)
        .map_err(|_| ForgeError::InvalidInput(format!("length {len} does not fit a compact-u16")))?;
    encode_compact_u16(len, out);
    Ok(())
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// An account referenced by an instruction, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation before compilation into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// An instruction with accounts replaced by indices into the message's key list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Recent blockhash. Transactions expire ~150 blocks after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blockhash([u8; 32]);

impl Blockhash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Blockhash {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ForgeError::Network(format!("malformed blockhash '{s}': {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ForgeError::Network(format!("malformed blockhash '{s}': wrong length")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// A compiled, unsigned legacy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

struct KeyRole {
    pubkey: Pubkey,
    is_signer: bool,
    is_writable: bool,
}

impl KeyRole {
    fn rank(&self) -> u8 {
        match (self.is_signer, self.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }
}

fn to_index(position: usize) -> ForgeResult<u8> {
    u8::try_from(position).map_err(|_| ForgeError::InvalidInput("too many accounts in message".into()))
}

impl Message {
    /// Compile instructions into a message paid for by `payer`.
    pub fn compile(instructions: &[Instruction], payer: &Pubkey, recent_blockhash: Blockhash) -> ForgeResult<Self> {
        let mut roles = vec![KeyRole {
            pubkey: *payer,
            is_signer: true,
            is_writable: true,
        }];
        let mut upsert = |pubkey: Pubkey, is_signer: bool, is_writable: bool| {
            match roles.iter_mut().find(|r| r.pubkey == pubkey) {
                Some(role) => {
                    role.is_signer |= is_signer;
                    role.is_writable |= is_writable;
                }
                None => roles.push(KeyRole {
                    pubkey,
                    is_signer,
                    is_writable,
                }),
            }
        };
        for ix in instructions {
            for meta in &ix.accounts {
                upsert(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        // Stable sort keeps the payer at index 0 of the first group.
        roles.sort_by_key(KeyRole::rank);

        let count = |f: fn(&KeyRole) -> bool| roles.iter().filter(|r| f(r)).count();
        let header = MessageHeader {
            num_required_signatures: to_index(count(|r| r.is_signer))?,
            num_readonly_signed_accounts: to_index(count(|r| r.is_signer && !r.is_writable))?,
            num_readonly_unsigned_accounts: to_index(count(|r| !r.is_signer && !r.is_writable))?,
        };
        let account_keys: Vec<Pubkey> = roles.into_iter().map(|r| r.pubkey).collect();

        let position = |key: &Pubkey| -> ForgeResult<u8> {
            let index = account_keys
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| ForgeError::InvalidInput(format!("account {key} missing from message")))?;
            to_index(index)
        };
        let compiled = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: position(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|meta| position(&meta.pubkey))
                        .collect::<ForgeResult<Vec<u8>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<ForgeResult<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    /// The keys that must sign, in signature order.
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..usize::from(self.header.num_required_signatures)]
    }

    /// Serialize for signing and submission.
    pub fn serialize(&self) -> ForgeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);

        encode_len(self.account_keys.len(), &mut out)?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.recent_blockhash.as_bytes());

        encode_len(self.instructions.len(), &mut out)?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_len(ix.accounts.len(), &mut out)?;
            out.extend_from_slice(&ix.accounts);
            encode_len(ix.data.len(), &mut out)?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed transaction, ready to submit.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    message_bytes: Vec<u8>,
}

impl Transaction {
    /// Sign `message` with the given keypairs. Every required signer must be
    /// present; extra or repeated keypairs are ignored.
    pub fn sign(message: &Message, signers: &[&WalletKeypair]) -> ForgeResult<Self> {
        let message_bytes = message.serialize()?;
        let signatures = message
            .signer_keys()
            .iter()
            .map(|key| {
                signers
                    .iter()
                    .find(|kp| kp.pubkey() == *key)
                    .map(|kp| kp.sign(&message_bytes))
                    .ok_or_else(|| ForgeError::InvalidInput(format!("missing signature for {key}")))
            })
            .collect::<ForgeResult<Vec<_>>>()?;
        Ok(Self {
            signatures,
            message_bytes,
        })
    }

    /// The first signature is the transaction's ID.
    pub fn id(&self) -> Option<&Signature> {
        self.signatures.first()
    }

    pub fn serialize(&self) -> ForgeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(1 + 64 * self.signatures.len() + self.message_bytes.len());
        encode_len(self.signatures.len(), &mut out)?;
        for sig in &self.signatures {
            out.extend_from_slice(sig.as_bytes());
        }
        out.extend_from_slice(&self.message_bytes);
        if out.len() > PACKET_DATA_SIZE {
            return Err(ForgeError::InvalidInput(format!(
                "transaction is {} bytes, limit is {PACKET_DATA_SIZE}",
                out.len()
            )));
        }
        Ok(out)
    }

    /// Base58 encoding for `sendTransaction`.
    pub fn to_base58(&self) -> ForgeResult<String> {
        Ok(bs58::encode(self.serialize()?).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    #[test]
    fn compact_u16_known_encodings() {
        let cases: [(u16, &[u8]); 6] = [
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
            (0xffff, &[0xff, 0xff, 0x03]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_compact_u16(value, &mut out);
            assert_eq!(out, expected, "encoding {value:#x}");
            assert_eq!(decode_compact_u16(&out).unwrap(), (value, expected.len()));
        }
    }

    #[test]
    fn compact_u16_rejects_truncation() {
        assert!(decode_compact_u16(&[0x80]).is_err());
        assert!(decode_compact_u16(&[]).is_err());
    }

    #[test]
    fn accounts_are_ordered_by_role_with_payer_first() {
        let payer = key(1);
        let program = key(9);
        let ix = Instruction {
            program_id: program,
            accounts: vec![
                AccountMeta::new_readonly(key(5), false),
                AccountMeta::new(key(4), false),
                AccountMeta::new_readonly(key(3), true),
                AccountMeta::new(key(2), true),
            ],
            data: vec![1, 2, 3],
        };
        let msg = Message::compile(&[ix], &payer, Blockhash::new([0; 32])).unwrap();

        assert_eq!(msg.account_keys, vec![key(1), key(2), key(3), key(4), key(5), key(9)]);
        assert_eq!(
            msg.header,
            MessageHeader {
                num_required_signatures: 3,
                num_readonly_signed_accounts: 1,
                num_readonly_unsigned_accounts: 2,
            }
        );
        assert_eq!(msg.instructions[0].program_id_index, 5);
        assert_eq!(msg.instructions[0].accounts, vec![4, 3, 2, 1]);
    }

    #[test]
    fn duplicate_accounts_merge_roles() {
        let payer = key(1);
        let ix_a = Instruction {
            program_id: key(9),
            accounts: vec![AccountMeta::new_readonly(key(2), false)],
            data: vec![],
        };
        let ix_b = Instruction {
            program_id: key(9),
            accounts: vec![AccountMeta::new(key(2), true), AccountMeta::new(payer, true)],
            data: vec![],
        };
        let msg = Message::compile(&[ix_a, ix_b], &payer, Blockhash::new([0; 32])).unwrap();

        assert_eq!(msg.account_keys, vec![key(1), key(2), key(9)]);
        assert_eq!(msg.header.num_required_signatures, 2);
        assert_eq!(msg.header.num_readonly_signed_accounts, 0);
        assert_eq!(msg.header.num_readonly_unsigned_accounts, 1);
    }

    #[test]
    fn message_layout() {
        let payer = key(1);
        let ix = Instruction {
            program_id: key(9),
            accounts: vec![AccountMeta::new(key(2), false)],
            data: vec![0xAA, 0xBB],
        };
        let bytes = Message::compile(&[ix], &payer, Blockhash::new([7; 32]))
            .unwrap()
            .serialize()
            .unwrap();

        assert_eq!(&bytes[..3], &[1, 0, 1]);
        assert_eq!(bytes[3], 3);
        assert_eq!(&bytes[4..36], &[1u8; 32]);
        assert_eq!(&bytes[100..132], &[7u8; 32]);
        assert_eq!(&bytes[132..], &[1, 2, 1, 1, 2, 0xAA, 0xBB]);
    }

    #[test]
    fn signed_transaction_verifies_and_requires_all_signers() {
        let payer = WalletKeypair::generate();
        let mint = WalletKeypair::generate();
        let ix = Instruction {
            program_id: key(9),
            accounts: vec![AccountMeta::new(mint.pubkey(), true)],
            data: vec![],
        };
        let msg = Message::compile(&[ix], &payer.pubkey(), Blockhash::new([3; 32])).unwrap();

        assert!(Transaction::sign(&msg, &[&payer]).is_err());

        let tx = Transaction::sign(&msg, &[&mint, &payer, &payer]).unwrap();
        let message_bytes = msg.serialize().unwrap();
        assert_eq!(tx.signatures.len(), 2);
        assert!(payer.pubkey().verify(&message_bytes, &tx.signatures[0]));
        assert!(mint.pubkey().verify(&message_bytes, &tx.signatures[1]));
        assert_eq!(tx.id(), Some(&tx.signatures[0]));

        let wire = tx.serialize().unwrap();
        assert_eq!(wire[0], 2);
        assert_eq!(&wire[1 + 128..], &message_bytes[..]);
    }

    #[test]
    fn oversized_transaction_rejected() {
        let payer = WalletKeypair::generate();
        let ix = Instruction {
            program_id: key(9),
            accounts: vec![],
            data: vec![0u8; PACKET_DATA_SIZE],
        };
        let msg = Message::compile(&[ix], &payer.pubkey(), Blockhash::new([0; 32])).unwrap();
        let tx = Transaction::sign(&msg, &[&payer]).unwrap();
        assert!(tx.serialize().is_err());
    }

    #[test]
    fn blockhash_parses_base58() {
        let hash = Blockhash::new([5; 32]);
        let parsed: Blockhash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!("short".parse::<Blockhash>().is_err());
    }
}
