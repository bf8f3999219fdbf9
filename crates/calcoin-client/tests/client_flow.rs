//! End-to-end flows through `ProgramClient` against an in-memory chain.

mod common;

use calcoin_client::client::{CLAIM, REGISTER_USER};
use calcoin_client::{
    ClientError, Durability, InterfaceError, KeypairWallet, SessionState, SubmitError,
    UserRecord, WalletError,
};
use chain_sol::{
    Address, Transaction, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID,
};
use common::{client_with, dapp_config_account, user_record_account, MockChain, Reply};

/// Accounts of the first instruction, in instruction order.
fn instruction_accounts(tx: &Transaction) -> Vec<Address> {
    let ix = &tx.message.instructions[0];
    ix.account_indices
        .iter()
        .map(|&i| tx.message.account_keys[i as usize])
        .collect()
}

fn is_writable(tx: &Transaction, key: &Address) -> bool {
    let m = &tx.message;
    let i = m.account_keys.iter().position(|k| k == key).unwrap();
    let signers = m.num_required_signatures as usize;
    if i < signers {
        i < signers - m.num_readonly_signed as usize
    } else {
        i < m.account_keys.len() - m.num_readonly_unsigned as usize
    }
}

// ─── Register ───────────────────────────────────────────────────────

#[tokio::test]
async fn register_user_targets_a_stable_user_address() {
    let chain = MockChain::new();
    let seed: [u8; 32] = rand::random();
    let client = client_with(seed, &chain);
    let user = client.connect().await.unwrap();

    let expected = client.user_address(&user).unwrap();
    assert_eq!(client.user_address(&user).unwrap(), expected);
    assert!(!expected.is_on_curve());

    let outcome = client.register_user().await.unwrap();
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.level, Durability::Confirmed);

    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    let tx = &sent[0];
    assert_eq!(tx.message.fee_payer(), Some(&user));
    assert_eq!(tx.message.instructions[0].data, vec![2, 241, 150, 223, 99, 214, 116, 97]);

    let accounts = instruction_accounts(tx);
    assert_eq!(accounts.len(), 6);
    assert_eq!(accounts[0], client.dapp_config_address().unwrap());
    assert_eq!(accounts[1], user);
    // No gateway token configured: the user's own address is passed.
    assert_eq!(accounts[2], user);
    assert_eq!(accounts[3], expected);
    assert!(is_writable(tx, &expected));
    assert!(!is_writable(tx, &accounts[0]));
}

#[tokio::test]
async fn different_users_get_different_records() {
    let chain = MockChain::new();
    let a = client_with([1; 32], &chain);
    let b = client_with([2; 32], &chain);
    let ua = a.connect().await.unwrap();
    let ub = b.connect().await.unwrap();

    assert_ne!(a.user_address(&ua).unwrap(), b.user_address(&ub).unwrap());
    assert_eq!(a.user_address(&ub).unwrap(), b.user_address(&ub).unwrap());
}

// ─── Checkpoint expiry ──────────────────────────────────────────────

#[tokio::test]
async fn expired_checkpoint_is_retried_with_fresh_signature() {
    let chain = MockChain::new();
    chain.script([Reply::Expire, Reply::Land(Durability::Finalized)]);
    let client = client_with([3; 32], &chain);
    client.connect().await.unwrap();

    let outcome = client.register_user().await.unwrap();
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.attempts <= client.config().submit.max_attempts);
    assert_eq!(chain.checkpoint_fetches(), 2);

    let sent = chain.sent();
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0].message.recent_blockhash, sent[1].message.recent_blockhash);
    assert_ne!(sent[0].id(), sent[1].id());
    assert_eq!(sent[1].id(), Some(outcome.signature));
}

#[tokio::test]
async fn persistent_expiry_gives_up_at_the_bound() {
    let chain = MockChain::new();
    chain.script([Reply::Expire, Reply::Expire, Reply::Expire]);
    let client = client_with([4; 32], &chain);
    client.connect().await.unwrap();

    let err = client.register_user().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Submit(SubmitError::Expired { attempts: 3 })
    ));
    assert_eq!(chain.send_count(), 3);
}

// ─── Schema mismatch ────────────────────────────────────────────────

#[tokio::test]
async fn claim_without_token_account_fails_before_the_network() {
    let chain = MockChain::new();
    let client = client_with([5; 32], &chain);
    let user = client.connect().await.unwrap();

    let mint = Address::new([0x33; 32]);
    let mut accounts = client.claim_accounts(&user, &mint).unwrap();
    let removed = accounts.remove(6);
    assert_eq!(removed.pubkey, client.user_token_account(&user, &mint).unwrap());

    let err = client.submit(CLAIM, &[], &accounts).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Interface(InterfaceError::AccountLayoutMismatch { .. })
    ));
    assert_eq!(chain.checkpoint_fetches(), 0);
    assert_eq!(chain.send_count(), 0);
}

#[tokio::test]
async fn unknown_operation_is_refused() {
    let chain = MockChain::new();
    let client = client_with([5; 32], &chain);
    client.connect().await.unwrap();

    let err = client.submit("initialize", &[], &[]).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Interface(InterfaceError::UnknownOperation(_))
    ));
    assert_eq!(chain.send_count(), 0);
}

// ─── Set exempt ─────────────────────────────────────────────────────

#[tokio::test]
async fn set_exempt_carries_the_new_address() {
    let chain = MockChain::new();
    let client = client_with([6; 32], &chain);
    let user = client.connect().await.unwrap();
    let new_exempt = Address::new([0xAB; 32]);

    client.set_exempt(new_exempt).await.unwrap();

    let tx = &chain.sent()[0];
    let data = &tx.message.instructions[0].data;
    assert_eq!(&data[..8], &[244, 73, 87, 190, 162, 124, 150, 24]);
    assert_eq!(&data[8..], new_exempt.as_bytes());

    let accounts = instruction_accounts(tx);
    assert_eq!(accounts, vec![client.dapp_config_address().unwrap(), user]);
    assert!(is_writable(tx, &accounts[0]));
}

// ─── Claim ──────────────────────────────────────────────────────────

#[tokio::test]
async fn claim_mints_into_the_token_2022_account() {
    let chain = MockChain::new();
    let client = client_with([7; 32], &chain);
    let user = client.connect().await.unwrap();

    let mint = Address::new([0x44; 32]);
    chain.put_account(
        client.dapp_config_address().unwrap(),
        dapp_config_account(mint, Address::default()),
    );

    client.claim_tokens().await.unwrap();

    let tx = &chain.sent()[0];
    assert_eq!(tx.message.instructions[0].data, vec![62, 198, 214, 193, 213, 159, 108, 210]);

    let accounts = instruction_accounts(tx);
    assert_eq!(accounts.len(), 11);
    assert_eq!(accounts[4], mint);
    assert_eq!(accounts[5], client.mint_authority_address().unwrap());
    assert_eq!(accounts[6], client.user_token_account(&user, &mint).unwrap());
    assert_eq!(accounts[7], TOKEN_2022_PROGRAM_ID);
    assert_eq!(accounts[8], ASSOCIATED_TOKEN_PROGRAM_ID);
    assert!(is_writable(tx, &accounts[6]));
    assert!(is_writable(tx, &mint));
}

#[tokio::test]
async fn program_rejection_is_explained() {
    let chain = MockChain::new();
    chain.script([Reply::Reject(
        "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1770",
    )]);
    let client = client_with([8; 32], &chain);
    client.connect().await.unwrap();
    chain.put_account(
        client.dapp_config_address().unwrap(),
        dapp_config_account(Address::new([0x44; 32]), Address::default()),
    );

    let err = client.claim_tokens().await.unwrap_err();
    let ClientError::Submit(SubmitError::Rejected { reason }) = err else {
        panic!("expected rejection, got {err:?}");
    };
    assert!(reason.contains("CooldownNotMet"));
    assert_eq!(chain.send_count(), 1);
}

// ─── Session gating ─────────────────────────────────────────────────

#[tokio::test]
async fn operations_before_connect_are_refused() {
    let chain = MockChain::new();
    let client = client_with([9; 32], &chain);

    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(matches!(
        client.set_exempt(Address::new([1; 32])).await,
        Err(ClientError::Wallet(WalletError::NotConnected))
    ));
    assert!(matches!(
        client.submit(REGISTER_USER, &[], &[]).await,
        Err(ClientError::Wallet(WalletError::NotConnected))
    ));
    assert_eq!(chain.send_count(), 0);
}

#[tokio::test]
async fn disconnect_disables_operations() {
    let chain = MockChain::new();
    let client = client_with([10; 32], &chain);
    client.connect().await.unwrap();
    client.disconnect().await.unwrap();

    assert!(!client.session().actions_enabled());
    assert!(client.register_user().await.is_err());
    assert_eq!(chain.send_count(), 0);
}

// ─── State ──────────────────────────────────────────────────────────

#[tokio::test]
async fn user_record_is_read_back() {
    let chain = MockChain::new();
    let client = client_with([11; 32], &chain);
    let user = KeypairWallet::from_seed([11; 32]).address();

    assert_eq!(client.fetch_user_record(&user).await.unwrap(), None);

    chain.put_account(
        client.user_address(&user).unwrap(),
        user_record_account(user, 1_700_000_000),
    );
    assert_eq!(
        client.fetch_user_record(&user).await.unwrap(),
        Some(UserRecord {
            authority: user,
            last_claimed_timestamp: 1_700_000_000
        })
    );
}

#[tokio::test]
async fn dapp_config_is_read_back() {
    let chain = MockChain::new();
    let client = client_with([12; 32], &chain);
    let exempt = Address::new([0x55; 32]);
    chain.put_account(
        client.dapp_config_address().unwrap(),
        dapp_config_account(Address::new([0x44; 32]), exempt),
    );

    let config = client.fetch_dapp_config().await.unwrap();
    assert_eq!(config.token_mint, Address::new([0x44; 32]));
    assert!(config.is_exempt(&exempt));
}
