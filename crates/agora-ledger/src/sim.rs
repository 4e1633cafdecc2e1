//! Simulated ledger
//!
//! An in-process stand-in for the escrow contracts, used by tests and the
//! demo. It checks what the real contracts check at the boundary:
//!
//! 1. Every fulfillment re-derives the condition ID from the submitted
//!    parameters; a mismatch is rejected with status `0`
//! 2. Delivery conditions need the lock fulfilled first
//! 3. The escrow releases to the receivers once every condition is
//!    fulfilled, or refunds the consumer once the lock is fulfilled and a
//!    later condition has timed out
//!
//! Time is measured in blocks of `block_time` since the ledger started.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use agora_crypto::{condition_id, hash_values, AbiValue};
use agora_types::{Address, Bytes32, ConditionState, U256};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    AgreementRecord, CreateAgreementRequest, EventHub, EventKind, FulfillRequest, LedgerClient, LedgerError,
    LedgerEvent, Result, TxReceipt,
};

/// Default duration of one simulated block
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_millis(10);

/// Kind of submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    CreateAgreement,
    FulfillLock,
    FulfillCondition,
    FulfillReward,
}

/// One submission seen by the simulated ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub kind: TxKind,
    pub agreement_id: Bytes32,
    /// `None` when the submission failed in transport
    pub status: Option<u64>,
}

#[derive(Debug, Clone)]
struct ConditionEntry {
    agreement_id: Bytes32,
    state: ConditionState,
    timeout: u64,
    timelock: u64,
    created_block: u64,
}

#[derive(Debug, Default)]
struct SimState {
    agreements: HashMap<Bytes32, AgreementRecord>,
    conditions: HashMap<Bytes32, ConditionEntry>,
    /// Unfulfilled conditions with a timeout, keyed by their expiry block
    deadlines: BTreeSet<(u64, Bytes32)>,
    balances: HashMap<Address, U256>,
    escrow: HashMap<Bytes32, U256>,
    log: Vec<TxRecord>,
}

impl SimState {
    /// Abort every unfulfilled condition whose timeout has passed
    fn expire(&mut self, block: u64) -> Vec<LedgerEvent> {
        let mut aborted = Vec::new();
        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > block {
                break;
            }
            self.deadlines.remove(&(deadline, id));
            let Some(entry) = self.conditions.get_mut(&id) else {
                continue;
            };
            if entry.state != ConditionState::Unfulfilled {
                continue;
            }
            entry.state = ConditionState::Aborted;
            let contract = self
                .agreements
                .get(&entry.agreement_id)
                .map(|a| a.template_id)
                .unwrap_or(Address::ZERO);
            aborted.push(LedgerEvent {
                kind: EventKind::ConditionAborted,
                agreement_id: entry.agreement_id,
                condition_id: Some(id),
                contract_address: contract,
                block_number: block,
            });
        }
        aborted
    }

    /// Number of conditions still waiting on a timeout
    fn pending_deadlines(&self) -> usize {
        self.deadlines.len()
    }

    fn state_of(&self, condition_id: &Bytes32) -> ConditionState {
        self.conditions
            .get(condition_id)
            .map(|c| c.state)
            .unwrap_or(ConditionState::Uninitialized)
    }

    fn balance(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or(U256::ZERO)
    }

    fn credit(&mut self, account: Address, amount: U256) -> std::result::Result<(), String> {
        let balance = self.balances.entry(account).or_insert(U256::ZERO);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| format!("balance overflow for {}", account))?;
        Ok(())
    }

    fn register(&mut self, request: &CreateAgreementRequest, block: u64) -> std::result::Result<(), String> {
        if self.agreements.contains_key(&request.agreement_id) {
            return Err("agreement already exists".to_string());
        }
        let count = request.condition_ids.len();
        if count == 0 || request.timeouts.len() != count || request.timelocks.len() != count {
            return Err("condition, timeout and timelock lists must align".to_string());
        }
        let unique: HashSet<&Bytes32> = request.condition_ids.iter().collect();
        if unique.len() != count {
            return Err("duplicate condition id".to_string());
        }
        if let Some(taken) = request.condition_ids.iter().find(|id| self.conditions.contains_key(*id)) {
            return Err(format!("condition {} already registered", taken));
        }

        for (i, id) in request.condition_ids.iter().enumerate() {
            if request.timeouts[i] > 0 {
                self.deadlines.insert((block + request.timeouts[i], *id));
            }
            self.conditions.insert(
                *id,
                ConditionEntry {
                    agreement_id: request.agreement_id,
                    state: ConditionState::Unfulfilled,
                    timeout: request.timeouts[i],
                    timelock: request.timelocks[i],
                    created_block: block,
                },
            );
        }
        self.agreements.insert(
            request.agreement_id,
            AgreementRecord {
                agreement_id: request.agreement_id,
                did: request.did.clone(),
                template_id: request.template_id,
                condition_ids: request.condition_ids.clone(),
                publisher: request.publisher,
                consumer: request.consumer,
                created_block: block,
            },
        );
        Ok(())
    }

    fn fulfill(
        &mut self,
        kind: TxKind,
        request: &FulfillRequest,
        price: U256,
        block: u64,
    ) -> std::result::Result<(), String> {
        let agreement = self
            .agreements
            .get(&request.agreement_id)
            .cloned()
            .ok_or_else(|| "unknown agreement".to_string())?;
        if !agreement.condition_ids.contains(&request.condition_id) {
            return Err("condition is not part of the agreement".to_string());
        }

        let derived = condition_id(
            &request.agreement_id,
            &request.contract_address,
            &hash_values(&request.values),
        );
        if derived != request.condition_id {
            return Err(format!("condition id mismatch: parameters derive {}", derived));
        }

        let entry = self
            .conditions
            .get(&request.condition_id)
            .cloned()
            .ok_or_else(|| "condition not registered".to_string())?;
        if entry.state != ConditionState::Unfulfilled {
            return Err(format!("condition is {:?}", entry.state));
        }
        if block < entry.created_block + entry.timelock {
            return Err("condition is timelocked".to_string());
        }

        let lock_id = agreement.condition_ids[0];
        match kind {
            TxKind::FulfillLock => {
                let available = self.balance(&agreement.consumer);
                if available < price {
                    return Err(format!("insufficient balance: have {}, need {}", available, price));
                }
                self.balances.insert(agreement.consumer, available - price);
                let held = self.escrow.entry(agreement.agreement_id).or_insert(U256::ZERO);
                *held += price;
            }
            TxKind::FulfillCondition => {
                if self.state_of(&lock_id) != ConditionState::Fulfilled {
                    return Err("lock condition not fulfilled".to_string());
                }
            }
            TxKind::FulfillReward => self.settle_escrow(&agreement, request)?,
            TxKind::CreateAgreement => return Err("not a fulfillment".to_string()),
        }

        if let Some(entry) = self.conditions.get_mut(&request.condition_id) {
            entry.state = ConditionState::Fulfilled;
            if entry.timeout > 0 {
                self.deadlines.remove(&(entry.created_block + entry.timeout, request.condition_id));
            }
        }
        Ok(())
    }

    fn settle_escrow(&mut self, agreement: &AgreementRecord, request: &FulfillRequest) -> std::result::Result<(), String> {
        let upstream: Vec<Bytes32> = agreement
            .condition_ids
            .iter()
            .copied()
            .filter(|id| *id != request.condition_id)
            .collect();
        let referenced: HashSet<Bytes32> = request
            .values
            .iter()
            .filter_map(|v| match v {
                AbiValue::Bytes32(b) => Some(*b),
                _ => None,
            })
            .collect();
        if upstream.iter().any(|id| !referenced.contains(id)) {
            return Err("escrow does not reference every upstream condition".to_string());
        }

        let held = self.escrow.get(&agreement.agreement_id).copied().unwrap_or(U256::ZERO);
        let states: Vec<ConditionState> = upstream.iter().map(|id| self.state_of(id)).collect();

        if states.iter().all(|s| *s == ConditionState::Fulfilled) {
            let amounts = request.values.iter().find_map(|v| match v {
                AbiValue::Uint256Array(a) => Some(a.clone()),
                _ => None,
            });
            let receivers = request.values.iter().find_map(|v| match v {
                AbiValue::AddressArray(r) => Some(r.clone()),
                _ => None,
            });
            let (amounts, receivers) = match (amounts, receivers) {
                (Some(a), Some(r)) if a.len() == r.len() => (a, r),
                _ => return Err("escrow needs aligned amounts and receivers".to_string()),
            };
            let total = amounts
                .iter()
                .try_fold(U256::ZERO, |acc, a| acc.checked_add(*a))
                .ok_or_else(|| "amounts overflow".to_string())?;
            if total != held {
                return Err(format!("escrow holds {}, release asks for {}", held, total));
            }
            for (receiver, amount) in receivers.into_iter().zip(amounts) {
                self.credit(receiver, amount)?;
            }
        } else if states.first() == Some(&ConditionState::Fulfilled)
            && states.iter().any(|s| *s == ConditionState::Aborted)
        {
            self.credit(agreement.consumer, held)?;
        } else {
            return Err("upstream conditions are not settled".to_string());
        }

        self.escrow.insert(agreement.agreement_id, U256::ZERO);
        Ok(())
    }
}

/// In-process ledger implementing [`LedgerClient`]
#[derive(Debug)]
pub struct SimulatedLedger {
    state: RwLock<SimState>,
    events: EventHub,
    block_time: Duration,
    started: Instant,
    pending_failures: AtomicU32,
    silenced: RwLock<HashSet<Address>>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::with_block_time(DEFAULT_BLOCK_TIME)
    }

    pub fn with_block_time(block_time: Duration) -> Self {
        Self {
            state: RwLock::new(SimState::default()),
            events: EventHub::default(),
            block_time,
            started: Instant::now(),
            pending_failures: AtomicU32::new(0),
            silenced: RwLock::new(HashSet::new()),
        }
    }

    /// Publish to a fresh event stream buffering `capacity` events per listener
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = EventHub::new(capacity);
        self
    }

    /// Conditions that can still time out
    pub async fn pending_deadlines(&self) -> usize {
        self.state.read().await.pending_deadlines()
    }

    /// The event stream this ledger publishes to
    pub fn events(&self) -> EventHub {
        self.events.clone()
    }

    pub fn current_block(&self) -> u64 {
        let block_nanos = self.block_time.as_nanos().max(1);
        (self.started.elapsed().as_nanos() / block_nanos) as u64
    }

    /// Credit an account out of thin air
    pub async fn mint(&self, account: Address, amount: U256) {
        let mut state = self.state.write().await;
        if let Err(reason) = state.credit(account, amount) {
            warn!(%account, %reason, "Mint failed");
        }
    }

    pub async fn balance(&self, account: &Address) -> U256 {
        self.state.read().await.balance(account)
    }

    /// Funds currently held in escrow for an agreement
    pub async fn escrowed(&self, agreement_id: &Bytes32) -> U256 {
        self.state
            .read()
            .await
            .escrow
            .get(agreement_id)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Fail the next `count` submissions with a transport error
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Stop publishing events emitted by `contract`
    pub async fn silence_events_from(&self, contract: Address) {
        self.silenced.write().await.insert(contract);
    }

    /// Every submission so far, in order
    pub async fn transactions(&self) -> Vec<TxRecord> {
        self.state.read().await.log.clone()
    }

    async fn take_failure(&self, kind: TxKind, agreement_id: Bytes32) -> Result<()> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            self.state.write().await.log.push(TxRecord {
                kind,
                agreement_id,
                status: None,
            });
            warn!(?kind, agreement_id = %agreement_id, "Injected transport failure");
            return Err(LedgerError::transport("simulated RPC failure"));
        }
        Ok(())
    }

    async fn publish(&self, events: Vec<LedgerEvent>) {
        let silenced = self.silenced.read().await;
        for event in events {
            if silenced.contains(&event.contract_address) {
                debug!(kind = ?event.kind, contract = %event.contract_address, "Event silenced");
                continue;
            }
            self.events.publish(event);
        }
    }

    fn receipt(&self, status: u64, block: u64) -> TxReceipt {
        TxReceipt {
            tx_hash: Bytes32::new(rand::random()),
            status,
            block_number: block,
        }
    }

    async fn submit_fulfillment(&self, kind: TxKind, request: &FulfillRequest, price: U256) -> Result<TxReceipt> {
        self.take_failure(kind, request.agreement_id).await?;
        let block = self.current_block();

        let mut state = self.state.write().await;
        let mut events = state.expire(block);
        let status = match state.fulfill(kind, request, price, block) {
            Ok(()) => {
                info!(
                    ?kind,
                    agreement_id = %request.agreement_id,
                    condition_id = %request.condition_id,
                    "Condition fulfilled"
                );
                events.push(LedgerEvent {
                    kind: EventKind::ConditionFulfilled,
                    agreement_id: request.agreement_id,
                    condition_id: Some(request.condition_id),
                    contract_address: request.contract_address,
                    block_number: block,
                });
                TxReceipt::SUCCESS
            }
            Err(reason) => {
                warn!(
                    ?kind,
                    agreement_id = %request.agreement_id,
                    condition_id = %request.condition_id,
                    %reason,
                    "Fulfillment rejected"
                );
                0
            }
        };
        state.log.push(TxRecord {
            kind,
            agreement_id: request.agreement_id,
            status: Some(status),
        });
        drop(state);

        self.publish(events).await;
        Ok(self.receipt(status, block))
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn create_agreement(&self, request: &CreateAgreementRequest) -> Result<TxReceipt> {
        self.take_failure(TxKind::CreateAgreement, request.agreement_id).await?;
        let block = self.current_block();

        let mut state = self.state.write().await;
        let mut events = state.expire(block);
        let status = match state.register(request, block) {
            Ok(()) => {
                info!(
                    agreement_id = %request.agreement_id,
                    did = %request.did,
                    conditions = request.condition_ids.len(),
                    "Agreement created"
                );
                events.push(LedgerEvent {
                    kind: EventKind::AgreementCreated,
                    agreement_id: request.agreement_id,
                    condition_id: None,
                    contract_address: request.template_id,
                    block_number: block,
                });
                TxReceipt::SUCCESS
            }
            Err(reason) => {
                warn!(agreement_id = %request.agreement_id, %reason, "Agreement rejected");
                0
            }
        };
        state.log.push(TxRecord {
            kind: TxKind::CreateAgreement,
            agreement_id: request.agreement_id,
            status: Some(status),
        });
        drop(state);

        self.publish(events).await;
        Ok(self.receipt(status, block))
    }

    async fn fulfill_lock(&self, request: &FulfillRequest, price: U256) -> Result<TxReceipt> {
        self.submit_fulfillment(TxKind::FulfillLock, request, price).await
    }

    async fn fulfill_condition(&self, request: &FulfillRequest) -> Result<TxReceipt> {
        self.submit_fulfillment(TxKind::FulfillCondition, request, U256::ZERO).await
    }

    async fn fulfill_reward(&self, request: &FulfillRequest) -> Result<TxReceipt> {
        self.submit_fulfillment(TxKind::FulfillReward, request, U256::ZERO).await
    }

    async fn condition_state(&self, condition_id: &Bytes32) -> Result<ConditionState> {
        let block = self.current_block();
        let mut state = self.state.write().await;
        let events = state.expire(block);
        let current = state.state_of(condition_id);
        drop(state);
        self.publish(events).await;
        Ok(current)
    }

    async fn agreement(&self, agreement_id: &Bytes32) -> Result<Option<AgreementRecord>> {
        Ok(self.state.read().await.agreements.get(agreement_id).cloned())
    }
}
