//! The subscription lifecycle state machine.
//!
//! Every operation follows the same shape:
//!
//! 1. Validate the request against the current records and the clock.
//! 2. Stage all ledger changes in one [`Projection`] and check it against
//!    the ledger ([`Ledger::stage`]).
//! 3. Settle value: pull from the payer first, then pay refunds and
//!    surpluses. A failed payout reverses the payouts already made and
//!    then the pull.
//! 4. Commit the staged ledger patch, then the records, then emit events.
//!
//! A rejected operation therefore leaves the ledger, the records, the event
//! log and (as far as the collaborator allows) escrow untouched.

use serde::{Deserialize, Serialize};
use subs_ledger::accrual::{self, Accrual};
use subs_ledger::{Ledger, Projection};
use subs_types::{Address, Amount, EpochIndex, LedgerEvent, PendingStream, Stream, Timestamp};

use crate::classify::{classify, ChangeKind};
use crate::params::{self, CreateParams};
use crate::ports::{Authorizer, Clock, ValueTransfer};
use crate::signers::SignerRegistry;
use crate::store::SubscriptionStore;
use crate::{Result, SubscriptionError};

/// Construction parameters for [`Subscriptions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionsConfig {
    /// Length of one epoch in time units.
    pub epoch_length: Timestamp,
    /// Identity of the ledger itself. It can never hold a stream.
    pub ledger_address: Address,
    /// Receiver of every collection.
    pub beneficiary: Address,
    /// The only caller allowed to use [`Subscriptions::create`]. Zero
    /// disables `create` until the beneficiary sets one.
    pub recurring_payments: Address,
}

/// Value paid out of escrow by an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub to: Address,
    pub amount: Amount,
}

/// Outcome of a lifecycle operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transition classification for indexers.
    pub kind: ChangeKind,
    /// The subscriber's stream record after the operation, if any.
    pub stream: Option<Stream>,
    /// Value pulled into escrow from the payer.
    pub charged: Amount,
    /// Refunds and surpluses paid out, in payment order.
    pub payouts: Vec<Payout>,
}

/// Serializable engine state, minus the collaborators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub ledger: Ledger,
    pub store: SubscriptionStore,
    pub signers: SignerRegistry,
    pub ledger_address: Address,
    pub beneficiary: Address,
    pub recurring_payments: Address,
}

impl EngineSnapshot {
    /// Encode as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        params::to_vec(self)
    }

    /// Decode from CBOR.
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        params::from_slice(data)
    }
}

/// Value pulled from a payer.
#[derive(Clone, Copy, Debug)]
struct Charge {
    from: Address,
    amount: Amount,
}

/// How a new stream is paid for.
#[derive(Clone, Copy, Debug)]
enum Funding {
    /// Pull exactly the stream value.
    Exact,
    /// Pull the offered amount and return the surplus to the payer.
    Offered(Amount),
}

/// A fully validated operation, ready to execute.
#[derive(Debug, Default)]
struct Plan {
    projection: Projection,
    charge: Option<Charge>,
    payouts: Vec<Payout>,
}

/// The subscription engine.
///
/// Owns the epoch ledger and the stream records; value custody, time and
/// signer authorization are delegated to `V`, `C` and `A`.
pub struct Subscriptions<V, C, A = SignerRegistry> {
    ledger: Ledger,
    store: SubscriptionStore,
    ledger_address: Address,
    beneficiary: Address,
    recurring_payments: Address,
    transfer: V,
    clock: C,
    authorizer: A,
    events: Vec<LedgerEvent>,
}

fn check_range(start: Timestamp, end: Timestamp, rate: Amount) -> Result<()> {
    if start >= end {
        return Err(SubscriptionError::InvalidRange(
            "start must be less than end".to_string(),
        ));
    }
    if rate == 0 {
        return Err(SubscriptionError::InvalidRange(
            "rate must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Narrow an unsigned time input into the ledger's signed time domain.
fn timestamp(value: u64, what: &str) -> Result<Timestamp> {
    Timestamp::try_from(value)
        .map_err(|_| SubscriptionError::InvalidRange(format!("{what} too large")))
}

fn stream_value(start: Timestamp, end: Timestamp, rate: Amount) -> Result<Amount> {
    accrual::value(start, end, rate).ok_or(SubscriptionError::Overflow)
}

impl<V, C, A> Subscriptions<V, C, A>
where
    V: ValueTransfer,
    C: Clock,
    A: Authorizer,
{
    /// Build an engine with an empty ledger.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] if the ledger address or the
    ///   beneficiary is zero
    /// - [`SubscriptionError::Ledger`] if the epoch length is not positive
    pub fn new(config: SubscriptionsConfig, transfer: V, clock: C, authorizer: A) -> Result<Self> {
        if config.ledger_address.is_zero() {
            return Err(SubscriptionError::InvalidParty(
                "ledger address cannot be zero".to_string(),
            ));
        }
        if config.beneficiary.is_zero() {
            return Err(SubscriptionError::InvalidParty(
                "beneficiary cannot be zero".to_string(),
            ));
        }
        let ledger = Ledger::new(config.epoch_length)?;
        tracing::info!(
            epoch_length = config.epoch_length,
            ledger = %config.ledger_address,
            beneficiary = %config.beneficiary,
            "subscriptions: engine created"
        );
        Ok(Self {
            ledger,
            store: SubscriptionStore::new(),
            ledger_address: config.ledger_address,
            beneficiary: config.beneficiary,
            recurring_payments: config.recurring_payments,
            transfer,
            clock,
            authorizer,
            events: Vec::new(),
        })
    }

    // ---- accessors ----

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_address(&self) -> Address {
        self.ledger_address
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    pub fn recurring_payments(&self) -> Address {
        self.recurring_payments
    }

    /// The value-transfer collaborator.
    pub fn transfer(&self) -> &V {
        &self.transfer
    }

    /// Mutable access to the value-transfer collaborator, for hosts that
    /// fund accounts or manage approvals through it.
    pub fn transfer_mut(&mut self) -> &mut V {
        &mut self.transfer
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current time according to the clock collaborator.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Current stream of `subscriber`.
    pub fn subscription(&self, subscriber: &Address) -> Option<&Stream> {
        self.store.get(subscriber)
    }

    /// Pending offer for `owner`.
    pub fn pending_subscription(&self, owner: &Address) -> Option<&PendingStream> {
        self.store.pending(owner)
    }

    /// Locked value of `subscriber`'s stream now.
    pub fn locked(&self, subscriber: &Address) -> Option<Amount> {
        let now = self.now();
        self.store.get(subscriber).map(|s| s.locked(now))
    }

    /// Unlocked (refundable) value of `subscriber`'s stream now.
    pub fn unlocked(&self, subscriber: &Address) -> Option<Amount> {
        let now = self.now();
        self.store.get(subscriber).map(|s| s.unlocked(now))
    }

    /// Whether `signer` may act for `owner`.
    pub fn check_authorized_signer(&self, owner: Address, signer: Address) -> bool {
        self.authorizer.is_authorized(owner, signer)
    }

    /// Events emitted so far and not yet drained.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Take all pending events, oldest first.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- lifecycle ----

    /// Start (or replace) a stream for `subscriber`, paid by `caller`.
    ///
    /// A start in the past is clamped to now. `caller` must be the
    /// subscriber or one of their authorized signers; a signer may not
    /// replace a stream that has not expired.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] for a zero subscriber or the
    ///   ledger itself
    /// - [`SubscriptionError::InvalidRange`] for `start >= end`, a zero rate,
    ///   an oversized time, or an end that is not in the future
    /// - [`SubscriptionError::Unauthorized`] if `caller` may not act for
    ///   `subscriber`
    /// - [`SubscriptionError::StateConflict`] if a signer tries to replace a
    ///   live stream
    /// - [`SubscriptionError::InsufficientFunds`] if escrow cannot be pulled
    pub fn subscribe(
        &mut self,
        caller: Address,
        subscriber: Address,
        start: u64,
        end: u64,
        rate: Amount,
    ) -> Result<Receipt> {
        self.check_party(subscriber)?;
        let start = timestamp(start, "start")?;
        let end = timestamp(end, "end")?;
        check_range(start, end, rate)?;

        if caller != subscriber {
            if !self.authorizer.is_authorized(subscriber, caller) {
                return Err(SubscriptionError::Unauthorized(format!(
                    "{caller} is not an authorized signer for {subscriber}"
                )));
            }
            let now = self.now();
            if self.store.get(&subscriber).is_some_and(|s| !s.is_expired(now)) {
                return Err(SubscriptionError::StateConflict(
                    "active subscription must be expired".to_string(),
                ));
            }
        }

        let start = self.effective_start(start, end)?;
        self.open_stream(caller, subscriber, start, end, rate, Funding::Exact)
    }

    /// Privileged stream creation on behalf of `user`, paid by the
    /// recurring-payments collaborator. Replaces any current stream of
    /// `user`, live or not.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::Unauthorized`] unless `caller` is the
    ///   recurring-payments address
    /// - [`SubscriptionError::InvalidParams`] if `payload` is not a
    ///   [`CreateParams`]
    /// - otherwise as [`Subscriptions::subscribe`]
    pub fn create(&mut self, caller: Address, user: Address, payload: &[u8]) -> Result<Receipt> {
        if self.recurring_payments.is_zero() || caller != self.recurring_payments {
            return Err(SubscriptionError::Unauthorized(
                "caller is not the recurring payments contract".to_string(),
            ));
        }
        let params = CreateParams::decode(payload)?;
        self.check_party(user)?;
        let start = timestamp(params.start, "start")?;
        let end = timestamp(params.end, "end")?;
        check_range(start, end, params.rate)?;

        let start = self.effective_start(start, end)?;
        self.open_stream(caller, user, start, end, params.rate, Funding::Exact)
    }

    /// Cancel the caller's stream.
    ///
    /// A stream that has not started is deleted with a full refund. A
    /// running stream is truncated at now and its unlocked value refunded.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::StateConflict`] if there is no stream or it
    ///   has already expired
    pub fn unsubscribe(&mut self, caller: Address) -> Result<Receipt> {
        let subscriber = caller;
        let Some(stream) = self.store.get(&subscriber).copied() else {
            return Err(SubscriptionError::StateConflict(
                "no active subscription".to_string(),
            ));
        };
        let now = self.now();
        if stream.is_expired(now) {
            return Err(SubscriptionError::StateConflict(
                "subscription has expired".to_string(),
            ));
        }

        let mut plan = Plan::default();
        self.settle_prior(Some(&stream), now, &mut plan)?;
        self.execute(&plan)?;

        let remaining = if now <= stream.start {
            self.store.remove(&subscriber);
            None
        } else {
            let truncated = Stream { end: now, ..stream };
            self.store.put(truncated);
            Some(truncated)
        };

        let epoch = self.ledger.epoch_of(now);
        tracing::info!(
            %subscriber,
            epoch,
            deleted = remaining.is_none(),
            "subscriptions: unsubscribed"
        );
        self.events.push(LedgerEvent::Unsubscribed { subscriber, epoch });

        Ok(Receipt {
            kind: ChangeKind::Canceled,
            stream: remaining,
            charged: 0,
            payouts: plan.payouts,
        })
    }

    /// Push the end of `subscriber`'s running stream to `new_end`, paid by
    /// `caller`.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] for a zero subscriber
    /// - [`SubscriptionError::StateConflict`] if there is no stream or it is
    ///   not running
    /// - [`SubscriptionError::InvalidRange`] if `new_end` is not after the
    ///   current end or is oversized
    /// - [`SubscriptionError::InsufficientFunds`] if escrow cannot be pulled
    pub fn extend(&mut self, caller: Address, subscriber: Address, new_end: u64) -> Result<Receipt> {
        self.check_party(subscriber)?;
        let new_end = timestamp(new_end, "end")?;
        let stream = self.active_stream(&subscriber)?;
        if new_end <= stream.end {
            return Err(SubscriptionError::InvalidRange(
                "new end must be after current end".to_string(),
            ));
        }
        self.extend_stream(caller, stream, new_end)
    }

    /// Extend `subscriber`'s running stream by as many whole time units as
    /// `amount` buys at the stream's rate. Only `rate * floor(amount / rate)`
    /// is pulled from `caller`.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] for a zero subscriber
    /// - [`SubscriptionError::InvalidRange`] if `amount` is zero, buys less
    ///   than one time unit, or would push the end out of range
    /// - [`SubscriptionError::StateConflict`] if there is no stream or it is
    ///   not running
    /// - [`SubscriptionError::InsufficientFunds`] if escrow cannot be pulled
    pub fn add_to(&mut self, caller: Address, subscriber: Address, amount: Amount) -> Result<Receipt> {
        self.check_party(subscriber)?;
        if amount == 0 {
            return Err(SubscriptionError::InvalidRange(
                "amount must be positive".to_string(),
            ));
        }
        let stream = self.active_stream(&subscriber)?;
        let units = amount / stream.rate;
        if units == 0 {
            return Err(SubscriptionError::InvalidRange(
                "amount buys less than one time unit".to_string(),
            ));
        }
        let new_end = Timestamp::try_from(units)
            .ok()
            .and_then(|units| stream.end.checked_add(units))
            .ok_or_else(|| SubscriptionError::InvalidRange("end too large".to_string()))?;
        self.extend_stream(caller, stream, new_end)
    }

    /// Record (or overwrite) an unfunded stream offer for `caller`.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] if `caller` is zero or the
    ///   ledger itself
    /// - [`SubscriptionError::InvalidRange`] for `start >= end`, a zero rate,
    ///   or an oversized time
    pub fn set_pending_subscription(
        &mut self,
        caller: Address,
        start: u64,
        end: u64,
        rate: Amount,
    ) -> Result<PendingStream> {
        self.check_party(caller)?;
        let start = timestamp(start, "start")?;
        let end = timestamp(end, "end")?;
        check_range(start, end, rate)?;

        let pending = PendingStream {
            owner: caller,
            start,
            end,
            rate,
        };
        self.store.put_pending(pending);

        let epoch = self.ledger.epoch_of(self.now());
        tracing::info!(owner = %caller, start, end, rate, "subscriptions: pending subscription set");
        self.events.push(LedgerEvent::PendingSubscriptionCreated {
            owner: caller,
            epoch,
            start,
            end,
            rate,
        });
        Ok(pending)
    }

    /// Fund `owner`'s pending offer with `funding` from `caller`.
    ///
    /// The offer becomes `owner`'s stream (start clamped to now), replacing
    /// any current one. Funding beyond the stream value is returned to
    /// `caller`.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::StateConflict`] if there is no offer or it has
    ///   expired
    /// - [`SubscriptionError::InsufficientFunds`] if `funding` is below the
    ///   remaining stream value or cannot be pulled
    pub fn fulfil(&mut self, caller: Address, owner: Address, funding: Amount) -> Result<Receipt> {
        let Some(pending) = self.store.pending(&owner).copied() else {
            return Err(SubscriptionError::StateConflict(
                "no pending subscription".to_string(),
            ));
        };
        let start = pending.start.max(self.now());
        if pending.end <= start {
            return Err(SubscriptionError::StateConflict(
                "pending subscription has expired".to_string(),
            ));
        }

        let receipt = self.open_stream(
            caller,
            owner,
            start,
            pending.end,
            pending.rate,
            Funding::Offered(funding),
        )?;
        self.store.remove_pending(&owner);
        Ok(receipt)
    }

    /// Change the privileged `create` caller.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::Unauthorized`] unless `caller` is the
    ///   beneficiary
    /// - [`SubscriptionError::InvalidParty`] if `recurring_payments` is zero
    pub fn set_recurring_payments(&mut self, caller: Address, recurring_payments: Address) -> Result<()> {
        if caller != self.beneficiary {
            return Err(SubscriptionError::Unauthorized(
                "only the beneficiary may set recurring payments".to_string(),
            ));
        }
        if recurring_payments.is_zero() {
            return Err(SubscriptionError::InvalidParty(
                "recurring payments cannot be zero".to_string(),
            ));
        }
        self.recurring_payments = recurring_payments;
        tracing::info!(%recurring_payments, "subscriptions: recurring payments updated");
        self.events
            .push(LedgerEvent::RecurringPaymentsUpdated { recurring_payments });
        Ok(())
    }

    // ---- collection ----

    /// Realize every completed epoch for the beneficiary.
    ///
    /// # Errors
    ///
    /// Ledger or payout failures; nothing is realized on error.
    pub fn collect(&mut self) -> Result<Amount> {
        let upto = self.last_completed_epoch();
        self.collect_upto(upto)
    }

    /// Realize epochs up to and including `upto`, which must have ended.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidRange`] if `upto` is the current or a
    ///   future epoch
    /// - otherwise as [`Subscriptions::collect`]
    pub fn collect_through(&mut self, upto: EpochIndex) -> Result<Amount> {
        let current = self.ledger.epoch_of(self.now());
        if upto >= current {
            return Err(SubscriptionError::InvalidRange(format!(
                "epoch {upto} has not ended (current epoch is {current})"
            )));
        }
        self.collect_upto(upto)
    }

    /// What [`Subscriptions::collect`] would pay out now.
    pub fn collectable(&self) -> Result<Amount> {
        Ok(self.ledger.collectable_through(self.last_completed_epoch())?)
    }

    /// Drop all-zero ledger buckets the cursor has passed.
    pub fn prune_collected(&mut self) -> usize {
        self.ledger.prune_collected()
    }

    // ---- internals ----

    fn last_completed_epoch(&self) -> EpochIndex {
        self.ledger.epoch_of(self.now()).saturating_sub(1)
    }

    fn collect_upto(&mut self, upto: EpochIndex) -> Result<Amount> {
        let amount = self.ledger.collectable_through(upto)?;
        if amount > 0 {
            self.transfer.escrow_out(self.beneficiary, amount)?;
        }
        self.ledger.collect(upto)?;
        if amount > 0 {
            self.events.push(LedgerEvent::Collected {
                upto_epoch: upto,
                amount,
            });
        }
        Ok(amount)
    }

    fn check_party(&self, party: Address) -> Result<()> {
        if party.is_zero() {
            return Err(SubscriptionError::InvalidParty(
                "subscriber cannot be the zero address".to_string(),
            ));
        }
        if party == self.ledger_address {
            return Err(SubscriptionError::InvalidParty(
                "subscriber cannot be the ledger itself".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp a past start to now and reject streams that would already be
    /// over.
    fn effective_start(&self, start: Timestamp, end: Timestamp) -> Result<Timestamp> {
        let start = start.max(self.now());
        if end <= start {
            return Err(SubscriptionError::InvalidRange(
                "end must be in the future".to_string(),
            ));
        }
        Ok(start)
    }

    fn active_stream(&self, subscriber: &Address) -> Result<Stream> {
        let stream = self
            .store
            .get(subscriber)
            .copied()
            .ok_or_else(|| SubscriptionError::StateConflict("no subscription found".to_string()))?;
        if !stream.is_active(self.now()) {
            return Err(SubscriptionError::StateConflict(
                "subscription must be active".to_string(),
            ));
        }
        Ok(stream)
    }

    /// Stage the settlement of a stream that is about to be cancelled or
    /// replaced: delete it if it has not started, truncate it at `now` if
    /// it is running, leave it alone if it has expired.
    fn settle_prior(&self, prior: Option<&Stream>, now: Timestamp, plan: &mut Plan) -> Result<()> {
        let Some(prior) = prior else {
            return Ok(());
        };
        if prior.is_expired(now) {
            return Ok(());
        }
        let mapper = self.ledger.mapper();
        let refund = if now <= prior.start {
            plan.projection
                .remove_stream(mapper, prior.start, prior.end, prior.rate)?;
            stream_value(prior.start, prior.end, prior.rate)?
        } else {
            plan.projection.retarget_end(mapper, prior.end, now, prior.rate)?;
            prior.unlocked(now)
        };
        plan.payouts.push(Payout {
            to: prior.subscriber,
            amount: refund,
        });
        Ok(())
    }

    /// Install a new stream for `subscriber`, settling the one it replaces.
    fn open_stream(
        &mut self,
        payer: Address,
        subscriber: Address,
        start: Timestamp,
        end: Timestamp,
        rate: Amount,
        funding: Funding,
    ) -> Result<Receipt> {
        let now = self.now();
        let value = stream_value(start, end, rate)?;
        let prior = self.store.get(&subscriber).copied();

        let mut plan = Plan::default();
        self.settle_prior(prior.as_ref(), now, &mut plan)?;
        plan.projection
            .insert_stream(self.ledger.mapper(), start, end, rate)?;

        let pulled = match funding {
            Funding::Exact => value,
            Funding::Offered(offered) => {
                if offered < value {
                    return Err(SubscriptionError::InsufficientFunds {
                        required: value,
                        available: offered,
                    });
                }
                if offered > value {
                    plan.payouts.push(Payout {
                        to: payer,
                        amount: offered - value,
                    });
                }
                offered
            }
        };
        plan.charge = Some(Charge {
            from: payer,
            amount: pulled,
        });

        self.execute(&plan)?;

        let stream = Stream {
            subscriber,
            start,
            end,
            rate,
        };
        let kind = classify(prior.as_ref(), &stream, now);
        self.store.put(stream);

        let epoch = self.ledger.epoch_of(start);
        tracing::info!(%subscriber, %payer, start, end, rate, ?kind, "subscriptions: subscribed");
        self.events.push(LedgerEvent::Subscribed {
            subscriber,
            epoch,
            start,
            end,
            rate,
        });

        Ok(Receipt {
            kind,
            stream: Some(stream),
            charged: pulled,
            payouts: plan.payouts,
        })
    }

    /// Move the end of a running stream later, paid by `payer`.
    fn extend_stream(&mut self, payer: Address, stream: Stream, new_end: Timestamp) -> Result<Receipt> {
        let added = stream_value(stream.end, new_end, stream.rate)?;

        let mut plan = Plan::default();
        plan.projection
            .retarget_end(self.ledger.mapper(), stream.end, new_end, stream.rate)?;
        plan.charge = Some(Charge {
            from: payer,
            amount: added,
        });
        self.execute(&plan)?;

        let extended = Stream {
            end: new_end,
            ..stream
        };
        let kind = classify(Some(&stream), &extended, self.now());
        self.store.put(extended);

        tracing::info!(
            subscriber = %stream.subscriber,
            old_end = stream.end,
            new_end,
            added,
            "subscriptions: extended"
        );
        self.events.push(LedgerEvent::Extended {
            subscriber: stream.subscriber,
            old_end: stream.end,
            new_end,
            amount_added: added,
        });

        Ok(Receipt {
            kind,
            stream: Some(extended),
            charged: added,
            payouts: Vec::new(),
        })
    }

    /// Check the staged ledger changes, settle value, then commit.
    fn execute(&mut self, plan: &Plan) -> Result<()> {
        let patch = self.ledger.stage(&plan.projection)?;
        self.settle(plan)?;
        self.ledger.commit(patch);
        Ok(())
    }

    fn settle(&mut self, plan: &Plan) -> Result<()> {
        let charge = plan.charge.filter(|c| c.amount > 0);
        if let Some(charge) = charge {
            self.transfer.escrow_in(charge.from, charge.amount)?;
        }
        let mut paid: Vec<Payout> = Vec::with_capacity(plan.payouts.len());
        for payout in plan.payouts.iter().filter(|p| p.amount > 0) {
            if let Err(err) = self.transfer.escrow_out(payout.to, payout.amount) {
                self.rollback(&paid, charge);
                return Err(err.into());
            }
            tracing::debug!(to = %payout.to, amount = payout.amount, "subscriptions: payout");
            paid.push(*payout);
        }
        Ok(())
    }

    /// Undo completed payouts, newest first, then the charge.
    fn rollback(&mut self, paid: &[Payout], charge: Option<Charge>) {
        for payout in paid.iter().rev() {
            if let Err(undo) = self.transfer.revert_escrow_out(payout.to, payout.amount) {
                tracing::error!(
                    to = %payout.to,
                    amount = payout.amount,
                    %undo,
                    "subscriptions: failed to reverse payout"
                );
            }
        }
        if let Some(charge) = charge {
            if let Err(undo) = self.transfer.revert_escrow_in(charge.from, charge.amount) {
                tracing::error!(
                    from = %charge.from,
                    amount = charge.amount,
                    %undo,
                    "subscriptions: failed to reverse charge"
                );
            }
        }
    }
}

impl<V, C> Subscriptions<V, C, SignerRegistry>
where
    V: ValueTransfer,
    C: Clock,
{
    /// Let `signer` act for `owner`. Returns `false` if it already could.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] if `signer` is zero or `owner`
    pub fn add_authorized_signer(&mut self, owner: Address, signer: Address) -> Result<bool> {
        let added = self.authorizer.add(owner, signer)?;
        tracing::info!(%owner, %signer, "subscriptions: authorized signer added");
        self.events
            .push(LedgerEvent::AuthorizedSignerAdded { owner, signer });
        Ok(added)
    }

    /// Revoke `signer` for `owner`. Returns `false` if it was not
    /// authorized.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] if `signer` is zero or `owner`
    pub fn remove_authorized_signer(&mut self, owner: Address, signer: Address) -> Result<bool> {
        let removed = self.authorizer.remove(owner, signer)?;
        tracing::info!(%owner, %signer, "subscriptions: authorized signer removed");
        self.events
            .push(LedgerEvent::AuthorizedSignerRemoved { owner, signer });
        Ok(removed)
    }

    /// Capture the engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            ledger: self.ledger.clone(),
            store: self.store.clone(),
            signers: self.authorizer.clone(),
            ledger_address: self.ledger_address,
            beneficiary: self.beneficiary,
            recurring_payments: self.recurring_payments,
        }
    }

    /// Rebuild an engine from a snapshot and fresh collaborators. The event
    /// log starts empty.
    pub fn restore(snapshot: EngineSnapshot, transfer: V, clock: C) -> Self {
        tracing::info!(
            streams = snapshot.store.len(),
            next_uncollected = snapshot.ledger.cursor().next_uncollected(),
            "subscriptions: engine restored"
        );
        Self {
            ledger: snapshot.ledger,
            store: snapshot.store,
            ledger_address: snapshot.ledger_address,
            beneficiary: snapshot.beneficiary,
            recurring_payments: snapshot.recurring_payments,
            transfer,
            clock,
            authorizer: snapshot.signers,
            events: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ports::TransferError;
    use crate::vault::Vault;

    const L: Timestamp = 100;
    const T0: Timestamp = 1_000;
    const FUNDS: Amount = 1_000_000;

    type Engine = Subscriptions<Vault, ManualClock>;

    fn addr(n: u8) -> Address {
        Address::from_low_u8(n)
    }

    fn ledger_addr() -> Address {
        addr(0xaa)
    }

    fn beneficiary() -> Address {
        addr(9)
    }

    fn recurring() -> Address {
        addr(8)
    }

    fn setup() -> (Engine, ManualClock) {
        let mut vault = Vault::new();
        for n in [1, 2, 3, 8] {
            vault.deposit(addr(n), FUNDS).expect("deposit");
            vault.approve(addr(n), FUNDS);
        }
        let clock = ManualClock::new(T0);
        let engine = Subscriptions::new(
            SubscriptionsConfig {
                epoch_length: L,
                ledger_address: ledger_addr(),
                beneficiary: beneficiary(),
                recurring_payments: recurring(),
            },
            vault,
            clock.clone(),
            SignerRegistry::new(),
        )
        .expect("engine");
        (engine, clock)
    }

    fn balance(engine: &Engine, n: u8) -> Amount {
        engine.transfer().balance_of(&addr(n))
    }

    fn t(v: Timestamp) -> u64 {
        u64::try_from(v).expect("non-negative")
    }

    #[test]
    fn test_rejects_zero_beneficiary() {
        let result = Subscriptions::new(
            SubscriptionsConfig {
                epoch_length: L,
                ledger_address: ledger_addr(),
                beneficiary: Address::ZERO,
                recurring_payments: recurring(),
            },
            Vault::new(),
            ManualClock::new(0),
            SignerRegistry::new(),
        );
        assert!(matches!(result, Err(SubscriptionError::InvalidParty(_))));
    }

    #[test]
    fn test_subscribe_future_stream() {
        let (mut engine, _) = setup();
        let receipt = engine
            .subscribe(addr(1), addr(1), t(T0 + 100), t(T0 + 500), 5)
            .expect("subscribe");

        assert_eq!(receipt.kind, ChangeKind::Created);
        assert_eq!(receipt.charged, 2_000);
        assert!(receipt.payouts.is_empty());
        assert_eq!(balance(&engine, 1), FUNDS - 2_000);
        assert_eq!(engine.transfer().escrowed(), 2_000);
        assert_eq!(
            engine.drain_events(),
            vec![LedgerEvent::Subscribed {
                subscriber: addr(1),
                epoch: 12,
                start: T0 + 100,
                end: T0 + 500,
                rate: 5,
            }]
        );
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_subscribe_clamps_past_start() {
        let (mut engine, _) = setup();
        let receipt = engine
            .subscribe(addr(1), addr(1), t(T0 - 10), t(T0 + 510), 5)
            .expect("subscribe");

        let stream = receipt.stream.expect("stream");
        assert_eq!(stream.start, T0);
        assert_eq!(receipt.charged, 5 * 510);
        assert_eq!(engine.subscription(&addr(1)), Some(&stream));
    }

    #[test]
    fn test_subscribe_validation() {
        let (mut engine, _) = setup();
        let cases = [
            (Address::ZERO, t(T0), t(T0 + 10), 1),
            (ledger_addr(), t(T0), t(T0 + 10), 1),
        ];
        for (subscriber, start, end, rate) in cases {
            let err = engine
                .subscribe(subscriber, subscriber, start, end, rate)
                .expect_err("bad party");
            assert!(matches!(err, SubscriptionError::InvalidParty(_)), "{err}");
        }

        let err = engine
            .subscribe(addr(1), addr(1), t(T0 + 10), t(T0 + 10), 1)
            .expect_err("empty range");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));

        let err = engine
            .subscribe(addr(1), addr(1), t(T0), u64::MAX, 1)
            .expect_err("oversized end");
        assert_eq!(err, SubscriptionError::InvalidRange("end too large".to_string()));

        let err = engine
            .subscribe(addr(1), addr(1), t(T0 - 50), t(T0), 1)
            .expect_err("already over");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));

        let err = engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 10), 0)
            .expect_err("zero rate");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));

        assert!(engine.events().is_empty());
        assert_eq!(engine.ledger().bucket_count(), 0);
    }

    #[test]
    fn test_signer_subscribes_for_owner() {
        let (mut engine, clock) = setup();
        let err = engine
            .subscribe(addr(2), addr(1), t(T0), t(T0 + 100), 1)
            .expect_err("not a signer");
        assert!(matches!(err, SubscriptionError::Unauthorized(_)));

        assert!(engine.add_authorized_signer(addr(1), addr(2)).expect("add"));
        assert!(engine.check_authorized_signer(addr(1), addr(2)));
        engine
            .subscribe(addr(2), addr(1), t(T0), t(T0 + 100), 1)
            .expect("signer subscribes");
        assert_eq!(balance(&engine, 2), FUNDS - 100);
        assert_eq!(balance(&engine, 1), FUNDS);

        let err = engine
            .subscribe(addr(2), addr(1), t(T0), t(T0 + 300), 2)
            .expect_err("live stream");
        assert!(matches!(err, SubscriptionError::StateConflict(_)));

        clock.set(T0 + 100);
        let receipt = engine
            .subscribe(addr(2), addr(1), t(T0 + 100), t(T0 + 300), 2)
            .expect("after expiry");
        assert_eq!(receipt.kind, ChangeKind::Renewal);
    }

    #[test]
    fn test_self_replacement_settles_prior_stream() {
        let (mut engine, clock) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 1_000), 3)
            .expect("first");
        clock.advance(100);

        let receipt = engine
            .subscribe(addr(1), addr(1), t(T0 + 100), t(T0 + 600), 5)
            .expect("replace");
        assert_eq!(receipt.kind, ChangeKind::Upgrade);
        assert_eq!(receipt.charged, 2_500);
        assert_eq!(
            receipt.payouts,
            vec![Payout {
                to: addr(1),
                amount: 2_700,
            }]
        );
        assert_eq!(balance(&engine, 1), FUNDS - 3_000 + 2_700 - 2_500);

        clock.set(T0 + 700);
        assert_eq!(engine.collect().expect("collect"), 300 + 2_500);
        assert_eq!(engine.transfer().escrowed(), 0);
        assert_eq!(balance(&engine, 9), 2_800);
    }

    #[test]
    fn test_downgrade_of_upcoming_stream_refunds_everything() {
        let (mut engine, _) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0 + 200), t(T0 + 400), 4)
            .expect("first");
        let receipt = engine
            .subscribe(addr(1), addr(1), t(T0 + 200), t(T0 + 400), 1)
            .expect("replace");
        assert_eq!(receipt.kind, ChangeKind::Downgrade);
        assert_eq!(receipt.payouts[0].amount, 800);
        assert_eq!(engine.transfer().escrowed(), 200);
    }

    #[test]
    fn test_unsubscribe_upcoming_deletes_stream() {
        let (mut engine, _) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0 + 50), t(T0 + 505), 5)
            .expect("subscribe");
        let receipt = engine.unsubscribe(addr(1)).expect("unsubscribe");

        assert_eq!(receipt.kind, ChangeKind::Canceled);
        assert!(receipt.stream.is_none());
        assert_eq!(balance(&engine, 1), FUNDS);
        assert!(engine.subscription(&addr(1)).is_none());
        for epoch in 1..=20 {
            assert!(engine.ledger().bucket(epoch).is_zero(), "epoch {epoch}");
        }
    }

    #[test]
    fn test_unsubscribe_running_truncates() {
        let (mut engine, clock) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 2)
            .expect("subscribe");
        clock.advance(250);
        let _ = engine.drain_events();

        let receipt = engine.unsubscribe(addr(1)).expect("unsubscribe");
        assert_eq!(receipt.payouts[0].amount, 500);
        assert_eq!(receipt.stream.map(|s| s.end), Some(T0 + 250));
        assert_eq!(
            engine.drain_events(),
            vec![LedgerEvent::Unsubscribed {
                subscriber: addr(1),
                epoch: 13,
            }]
        );

        let err = engine.unsubscribe(addr(1)).expect_err("expired");
        assert_eq!(
            err,
            SubscriptionError::StateConflict("subscription has expired".to_string())
        );

        clock.set(T0 + 400);
        assert_eq!(engine.collect().expect("collect"), 500);
        assert_eq!(engine.transfer().escrowed(), 0);
    }

    #[test]
    fn test_unsubscribe_without_stream() {
        let (mut engine, _) = setup();
        let err = engine.unsubscribe(addr(1)).expect_err("none");
        assert_eq!(
            err,
            SubscriptionError::StateConflict("no active subscription".to_string())
        );
    }

    #[test]
    fn test_extend_running_stream() {
        let (mut engine, clock) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 3)
            .expect("subscribe");
        clock.advance(10);
        let _ = engine.drain_events();

        let err = engine
            .extend(addr(2), addr(1), t(T0 + 500))
            .expect_err("not later");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));

        let receipt = engine.extend(addr(2), addr(1), t(T0 + 800)).expect("extend");
        assert_eq!(receipt.kind, ChangeKind::Renewal);
        assert_eq!(receipt.charged, 900);
        assert_eq!(balance(&engine, 2), FUNDS - 900);
        assert_eq!(
            engine.drain_events(),
            vec![LedgerEvent::Extended {
                subscriber: addr(1),
                old_end: T0 + 500,
                new_end: T0 + 800,
                amount_added: 900,
            }]
        );

        clock.set(T0 + 900);
        assert_eq!(engine.collect().expect("collect"), 3 * 800);
    }

    #[test]
    fn test_extend_requires_running_stream() {
        let (mut engine, clock) = setup();
        let err = engine.extend(addr(1), addr(1), t(T0 + 10)).expect_err("none");
        assert!(matches!(err, SubscriptionError::StateConflict(_)));

        engine
            .subscribe(addr(1), addr(1), t(T0 + 100), t(T0 + 200), 1)
            .expect("upcoming");
        let err = engine.extend(addr(1), addr(1), t(T0 + 300)).expect_err("upcoming");
        assert!(matches!(err, SubscriptionError::StateConflict(_)));

        clock.set(T0 + 200);
        let err = engine.extend(addr(1), addr(1), t(T0 + 300)).expect_err("expired");
        assert!(matches!(err, SubscriptionError::StateConflict(_)));
    }

    #[test]
    fn test_add_to_uses_whole_units() {
        let (mut engine, _) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 3)
            .expect("subscribe");

        let receipt = engine.add_to(addr(2), addr(1), 100).expect("add");
        assert_eq!(receipt.charged, 99);
        assert_eq!(receipt.stream.map(|s| s.end), Some(T0 + 533));
        assert_eq!(balance(&engine, 2), FUNDS - 99);

        let err = engine.add_to(addr(2), addr(1), 2).expect_err("too small");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));
        let err = engine.add_to(addr(2), addr(1), 0).expect_err("zero");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));
        let err = engine.add_to(addr(2), Address::ZERO, 10).expect_err("zero party");
        assert!(matches!(err, SubscriptionError::InvalidParty(_)));
    }

    #[test]
    fn test_fulfil_pending_subscription() {
        let (mut engine, _) = setup();
        engine
            .set_pending_subscription(addr(1), t(T0 - 100), t(T0 + 600), 2)
            .expect("pending");
        assert_eq!(
            engine.drain_events(),
            vec![LedgerEvent::PendingSubscriptionCreated {
                owner: addr(1),
                epoch: 11,
                start: T0 - 100,
                end: T0 + 600,
                rate: 2,
            }]
        );

        let err = engine.fulfil(addr(2), addr(1), 1_199).expect_err("short");
        assert_eq!(
            err,
            SubscriptionError::InsufficientFunds {
                required: 1_200,
                available: 1_199,
            }
        );

        let receipt = engine.fulfil(addr(2), addr(1), 2_000).expect("fulfil");
        assert_eq!(receipt.charged, 2_000);
        assert_eq!(
            receipt.payouts,
            vec![Payout {
                to: addr(2),
                amount: 800,
            }]
        );
        assert_eq!(balance(&engine, 2), FUNDS - 1_200);
        assert_eq!(balance(&engine, 1), FUNDS);
        assert!(engine.pending_subscription(&addr(1)).is_none());
        let stream = engine.subscription(&addr(1)).expect("owner stream");
        assert_eq!((stream.start, stream.end, stream.rate), (T0, T0 + 600, 2));
        assert!(engine.subscription(&addr(2)).is_none());

        let err = engine.fulfil(addr(2), addr(1), 2_000).expect_err("consumed");
        assert_eq!(
            err,
            SubscriptionError::StateConflict("no pending subscription".to_string())
        );
    }

    #[test]
    fn test_fulfil_replaces_owner_stream_only() {
        let (mut engine, clock) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 5)
            .expect("owner stream");
        engine
            .subscribe(addr(2), addr(2), t(T0), t(T0 + 500), 1)
            .expect("funder stream");
        engine
            .set_pending_subscription(addr(1), t(T0 + 500), t(T0 + 1_000), 5)
            .expect("pending");
        clock.advance(100);

        let receipt = engine.fulfil(addr(2), addr(1), 2_500).expect("fulfil");
        assert_eq!(receipt.payouts[0], Payout { to: addr(1), amount: 2_000 });
        assert_eq!(engine.subscription(&addr(2)).map(|s| s.end), Some(T0 + 500));
    }

    #[test]
    fn test_fulfil_expired_pending() {
        let (mut engine, clock) = setup();
        engine
            .set_pending_subscription(addr(1), t(T0 - 100), t(T0 + 200), 1)
            .expect("pending");
        clock.advance(200);
        let err = engine.fulfil(addr(2), addr(1), 1_000).expect_err("expired");
        assert_eq!(
            err,
            SubscriptionError::StateConflict("pending subscription has expired".to_string())
        );
        assert!(engine.pending_subscription(&addr(1)).is_some());
    }

    #[test]
    fn test_create_is_privileged() {
        let (mut engine, _) = setup();
        let payload = CreateParams {
            start: t(T0),
            end: t(T0 + 100),
            rate: 4,
        }
        .encode()
        .expect("encode");

        let err = engine.create(addr(1), addr(1), &payload).expect_err("not privileged");
        assert!(matches!(err, SubscriptionError::Unauthorized(_)));
        let err = engine.create(recurring(), addr(1), &[0x01]).expect_err("garbage");
        assert!(matches!(err, SubscriptionError::InvalidParams(_)));

        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 1)
            .expect("own stream");
        let receipt = engine.create(recurring(), addr(1), &payload).expect("create");
        assert_eq!(receipt.charged, 400);
        assert_eq!(receipt.payouts[0], Payout { to: addr(1), amount: 500 });
        assert_eq!(balance(&engine, 8), FUNDS - 400);
    }

    #[test]
    fn test_set_recurring_payments() {
        let (mut engine, _) = setup();
        let err = engine
            .set_recurring_payments(addr(1), addr(3))
            .expect_err("not beneficiary");
        assert!(matches!(err, SubscriptionError::Unauthorized(_)));
        let err = engine
            .set_recurring_payments(beneficiary(), Address::ZERO)
            .expect_err("zero");
        assert!(matches!(err, SubscriptionError::InvalidParty(_)));

        engine
            .set_recurring_payments(beneficiary(), addr(3))
            .expect("set");
        assert_eq!(engine.recurring_payments(), addr(3));
        assert_eq!(
            engine.drain_events(),
            vec![LedgerEvent::RecurringPaymentsUpdated {
                recurring_payments: addr(3),
            }]
        );
    }

    #[test]
    fn test_collect_completed_epochs_only() {
        let (mut engine, clock) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 1)
            .expect("subscribe");
        clock.set(T0 + 250);
        let _ = engine.drain_events();

        let err = engine.collect_through(13).expect_err("current epoch");
        assert!(matches!(err, SubscriptionError::InvalidRange(_)));
        assert_eq!(engine.collectable().expect("preview"), 200);
        assert_eq!(engine.collect_through(11).expect("prefix"), 100);
        assert_eq!(engine.collect().expect("rest"), 100);
        assert_eq!(engine.collect().expect("again"), 0);
        assert_eq!(
            engine.drain_events(),
            vec![
                LedgerEvent::Collected {
                    upto_epoch: 11,
                    amount: 100,
                },
                LedgerEvent::Collected {
                    upto_epoch: 12,
                    amount: 100,
                },
            ]
        );

        clock.set(T0 + 600);
        assert_eq!(engine.collect().expect("tail"), 300);
        assert_eq!(balance(&engine, 9), 500);
    }

    #[test]
    fn test_failed_escrow_leaves_state_untouched() {
        let (mut engine, clock) = setup();
        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 2)
            .expect("subscribe");
        clock.advance(100);
        let _ = engine.drain_events();
        engine.transfer_mut().approve(addr(1), 10);
        let before = engine.snapshot();

        let err = engine
            .subscribe(addr(1), addr(1), t(T0 + 100), t(T0 + 900), 2)
            .expect_err("allowance");
        assert_eq!(
            err,
            SubscriptionError::InsufficientFunds {
                required: 1_600,
                available: 10,
            }
        );
        assert_eq!(engine.snapshot(), before);
        assert!(engine.events().is_empty());
        assert_eq!(engine.transfer().escrowed(), 1_000);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (mut engine, clock) = setup();
        engine.add_authorized_signer(addr(1), addr(3)).expect("signer");
        engine
            .subscribe(addr(3), addr(1), t(T0), t(T0 + 700), 2)
            .expect("subscribe");
        engine
            .set_pending_subscription(addr(2), t(T0 + 50), t(T0 + 90), 1)
            .expect("pending");
        clock.set(T0 + 300);
        engine.collect().expect("collect");

        let snapshot = engine.snapshot();
        let bytes = snapshot.to_cbor().expect("encode");
        let decoded = EngineSnapshot::from_cbor(&bytes).expect("decode");
        assert_eq!(decoded, snapshot);

        let vault = engine.transfer().clone();
        let mut restored = Subscriptions::restore(decoded, vault, clock.clone());
        assert_eq!(restored.snapshot(), snapshot);
        assert!(restored.check_authorized_signer(addr(1), addr(3)));
        clock.set(T0 + 800);
        assert_eq!(restored.collect().expect("collect"), 2 * 400);
    }

    /// Vault that fails its `fail_on`-th payout.
    struct FailingVault {
        inner: Vault,
        fail_on: usize,
        outs: usize,
    }

    impl ValueTransfer for FailingVault {
        fn escrow_in(
            &mut self,
            from: Address,
            amount: Amount,
        ) -> std::result::Result<(), TransferError> {
            self.inner.escrow_in(from, amount)
        }

        fn escrow_out(
            &mut self,
            to: Address,
            amount: Amount,
        ) -> std::result::Result<(), TransferError> {
            self.outs += 1;
            if self.outs == self.fail_on {
                return Err(TransferError::Overflow);
            }
            self.inner.escrow_out(to, amount)
        }

        fn revert_escrow_in(
            &mut self,
            from: Address,
            amount: Amount,
        ) -> std::result::Result<(), TransferError> {
            self.inner.revert_escrow_in(from, amount)
        }

        fn revert_escrow_out(
            &mut self,
            to: Address,
            amount: Amount,
        ) -> std::result::Result<(), TransferError> {
            self.inner.revert_escrow_out(to, amount)
        }
    }

    #[test]
    fn test_failed_second_payout_reverts_whole_settlement() {
        let mut vault = Vault::new();
        for n in [1, 2] {
            vault.deposit(addr(n), FUNDS).expect("deposit");
            vault.approve(addr(n), FUNDS);
        }
        let clock = ManualClock::new(T0);
        let mut engine = Subscriptions::new(
            SubscriptionsConfig {
                epoch_length: L,
                ledger_address: ledger_addr(),
                beneficiary: beneficiary(),
                recurring_payments: recurring(),
            },
            FailingVault {
                inner: vault,
                fail_on: 2,
                outs: 0,
            },
            clock.clone(),
            SignerRegistry::new(),
        )
        .expect("engine");

        engine
            .subscribe(addr(1), addr(1), t(T0), t(T0 + 500), 2)
            .expect("subscribe");
        engine
            .set_pending_subscription(addr(1), t(T0 + 100), t(T0 + 300), 1)
            .expect("pending");
        clock.set(T0 + 100);
        let _ = engine.drain_events();

        let vault_before = engine.transfer().inner.clone();
        let ledger_before = engine.ledger().clone();
        let stream_before = engine.subscription(&addr(1)).copied();

        // Payout 1 refunds the owner's running stream, payout 2 returns the
        // funder's surplus and fails.
        let err = engine
            .fulfil(addr(2), addr(1), 1_000)
            .expect_err("second payout fails");
        assert_eq!(err, SubscriptionError::Transfer(TransferError::Overflow));

        assert_eq!(engine.transfer().inner, vault_before);
        assert_eq!(engine.transfer().inner.escrowed(), 1_000);
        assert_eq!(engine.transfer().inner.allowance(&addr(2)), FUNDS);
        assert_eq!(engine.ledger(), &ledger_before);
        assert_eq!(engine.subscription(&addr(1)).copied(), stream_before);
        assert!(engine.pending_subscription(&addr(1)).is_some());
        assert!(engine.events().is_empty());
    }
}
