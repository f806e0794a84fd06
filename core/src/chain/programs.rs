//! # Program Instructions
//!
//! The handful of system, SPL Token and Associated Token Account
//! instructions the token workflow needs, encoded by hand.

use crate::crypto::keys::{KeyError, Pubkey};
use crate::chain::transaction::{AccountMeta, Instruction};

/// `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0u8; 32]);

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133, 237,
    95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// Size of an SPL token account in bytes.
pub const TOKEN_ACCOUNT_LEN: u64 = 165;

// Instruction discriminators.
const SYSTEM_CREATE_ACCOUNT: u32 = 0;
const TOKEN_MINT_TO: u8 = 7;
const TOKEN_INITIALIZE_MINT2: u8 = 20;
const ATA_CREATE_IDEMPOTENT: u8 = 1;

// ---------------------------------------------------------------------------
// System program
// ---------------------------------------------------------------------------

/// Allocate `space` bytes at `new_account`, fund it with `lamports`, and
/// assign it to `owner`. Both `from` and `new_account` must sign.
pub fn create_account(from: &Pubkey, new_account: &Pubkey, lamports: u64, space: u64, owner: &Pubkey) -> Instruction {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&SYSTEM_CREATE_ACCOUNT.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_bytes());

    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*new_account, true)],
        data,
    }
}

// ---------------------------------------------------------------------------
// SPL Token
// ---------------------------------------------------------------------------

/// Initialize a mint account that already exists and is owned by the token
/// program. The `2` variant does not need the rent sysvar.
pub fn initialize_mint2(
    mint: &Pubkey,
    mint_authority: &Pubkey,
    freeze_authority: Option<&Pubkey>,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(67);
    data.push(TOKEN_INITIALIZE_MINT2);
    data.push(decimals);
    data.extend_from_slice(mint_authority.as_bytes());
    match freeze_authority {
        Some(authority) => {
            data.push(1);
            data.extend_from_slice(authority.as_bytes());
        }
        None => data.push(0),
    }

    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*mint, false)],
        data,
    }
}

pub fn mint_to(mint: &Pubkey, destination: &Pubkey, authority: &Pubkey, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_MINT_TO);
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

// ---------------------------------------------------------------------------
// Associated Token Account
// ---------------------------------------------------------------------------

/// The canonical token account for `wallet` holding `mint`:
/// `PDA([wallet, token_program, mint], associated_token_program)`.
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Result<Pubkey, KeyError> {
    let (address, _bump) = Pubkey::find_program_address(
        &[wallet.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )?;
    Ok(address)
}

/// Create the associated token account, succeeding if it already exists.
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    associated_account: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*associated_account, false),
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_ids_render_as_published() {
        assert_eq!(SYSTEM_PROGRAM_ID.to_string(), "11111111111111111111111111111111");
        assert_eq!(TOKEN_PROGRAM_ID.to_string(), "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
            "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        );
    }

    #[test]
    fn associated_token_address_known_vector() {
        let wallet = Pubkey::new_from_array([7u8; 32]);
        let mint = Pubkey::new_from_array([9u8; 32]);
        assert_eq!(wallet.to_string(), "US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx");
        assert_eq!(mint.to_string(), "cGfHiC6Kgg3FpFZvgwGcswsCRtp4aBP2fzuXRQPizuN");

        let ata = associated_token_address(&wallet, &mint).unwrap();
        assert_eq!(ata.to_string(), "BjmJ1yi1Sc4s9xQaiv4DbRuUhgfjUSc8cYSuwsFqoS9");
        assert!(!ata.is_on_curve());
    }

    #[test]
    fn create_account_layout() {
        let from = Pubkey::new_from_array([1; 32]);
        let new = Pubkey::new_from_array([2; 32]);
        let ix = create_account(&from, &new, 1_461_600, 82, &TOKEN_PROGRAM_ID);

        assert_eq!(ix.program_id, SYSTEM_PROGRAM_ID);
        assert_eq!(ix.data.len(), 52);
        assert_eq!(&ix.data[..4], &[0, 0, 0, 0]);
        assert_eq!(&ix.data[4..12], &1_461_600u64.to_le_bytes());
        assert_eq!(&ix.data[12..20], &82u64.to_le_bytes());
        assert_eq!(&ix.data[20..], TOKEN_PROGRAM_ID.as_bytes());
        assert!(ix.accounts.iter().all(|a| a.is_signer && a.is_writable));
    }

    #[test]
    fn initialize_mint2_without_freeze_authority() {
        let mint = Pubkey::new_from_array([2; 32]);
        let authority = Pubkey::new_from_array([1; 32]);
        let ix = initialize_mint2(&mint, &authority, None, 9);

        assert_eq!(ix.data.len(), 35);
        assert_eq!(&ix.data[..2], &[20, 9]);
        assert_eq!(&ix.data[2..34], authority.as_bytes());
        assert_eq!(ix.data[34], 0);
        assert_eq!(ix.accounts, vec![AccountMeta::new(mint, false)]);
    }

    #[test]
    fn initialize_mint2_with_freeze_authority() {
        let mint = Pubkey::new_from_array([2; 32]);
        let authority = Pubkey::new_from_array([1; 32]);
        let freeze = Pubkey::new_from_array([3; 32]);
        let ix = initialize_mint2(&mint, &authority, Some(&freeze), 6);

        assert_eq!(ix.data.len(), 67);
        assert_eq!(ix.data[34], 1);
        assert_eq!(&ix.data[35..], freeze.as_bytes());
    }

    #[test]
    fn mint_to_layout() {
        let mint = Pubkey::new_from_array([2; 32]);
        let dest = Pubkey::new_from_array([4; 32]);
        let auth = Pubkey::new_from_array([1; 32]);
        let ix = mint_to(&mint, &dest, &auth, 1_000_000_000_000);

        assert_eq!(ix.data[0], 7);
        assert_eq!(&ix.data[1..], &1_000_000_000_000u64.to_le_bytes());
        assert!(ix.accounts[2].is_signer && !ix.accounts[2].is_writable);
    }

    #[test]
    fn create_ata_idempotent_accounts() {
        let payer = Pubkey::new_from_array([1; 32]);
        let mint = Pubkey::new_from_array([2; 32]);
        let ata = associated_token_address(&payer, &mint).unwrap();
        let ix = create_associated_token_account_idempotent(&payer, &ata, &payer, &mint);

        assert_eq!(ix.data, vec![1]);
        assert_eq!(ix.accounts.len(), 6);
        assert_eq!(ix.accounts[1].pubkey, ata);
        assert_eq!(ix.accounts[5].pubkey, TOKEN_PROGRAM_ID);
    }
}
