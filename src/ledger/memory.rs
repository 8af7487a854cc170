// 6.1 memory.rs: in-process ledger. transactions are serializable: begin() takes the state lock,
// the first write stages a copy of the book, commit swaps it in. audit history is append-only and
// never copied: a tx buffers its new records and commit appends them. dropping a tx discards both.
// exposure reads on the ledger itself take the same lock,
// so inside a tx read exposure through the tx.

use super::{
    AccountLedger, AuditLedger, ExecutionContext, ExposureSource, Ledger, LedgerError, LedgerTx,
    NumberKind, OrderLedger, OrderLock, OrderLocks, PositionLedger,
};
use crate::account::Account;
use crate::audit::{LpRoute, TransactionRecord};
use crate::instrument::{InstrumentCatalog, InstrumentMeta};
use crate::order::Order;
use crate::position::Contract;
use crate::types::{AccountId, ContractId, OrderId, PairId, Quote};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Failures the memory ledger can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The nth contract insert (1-based) inside any transaction fails.
    ContractInsert { nth: usize },
    /// Updating this contract fails.
    ContractUpdate(ContractId),
    /// Exposure queries fail.
    ExposureRead,
    /// Commit fails.
    Commit,
}

// mutable book state, staged per transaction
#[derive(Debug, Clone, Default)]
struct Book {
    accounts: HashMap<AccountId, Account>,
    balances: HashMap<(AccountId, String), Decimal>,
    orders: HashMap<OrderId, Order>,
    contracts: BTreeMap<ContractId, Contract>,
    contract_seq: u64,
    transaction_seq: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    book: Book,
    transactions: Vec<TransactionRecord>,
    lp_routes: Vec<LpRoute>,
}

impl Book {
    fn contracts_where(&self, pred: impl Fn(&Contract) -> bool) -> Vec<Contract> {
        let mut found: Vec<Contract> =
            self.contracts.values().filter(|c| pred(c)).cloned().collect();
        found.sort_by(|a, b| a.contract_number.cmp(&b.contract_number));
        found
    }

    fn exposure(&self, symbol: Option<&str>) -> Decimal {
        self.contracts
            .values()
            .filter(|c| c.is_open())
            .filter(|c| symbol.map_or(true, |s| c.symbol == s))
            .map(Contract::signed_exposure)
            .sum()
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    instruments: RwLock<HashMap<String, InstrumentMeta>>,
    locks: OrderLocks,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, account: Account) {
        self.state.lock().book.accounts.insert(account.id, account);
    }

    // shortcut: new account in `currency` funded with `balance`
    pub fn open_account(&self, currency: &str, balance: Decimal) -> AccountId {
        let account = Account::new(currency);
        let id = account.id;
        self.add_account(account);
        self.set_balance(id, currency, balance);
        id
    }

    pub fn set_balance(&self, account: AccountId, currency: &str, amount: Decimal) {
        self.state
            .lock()
            .book
            .balances
            .insert((account, currency.to_string()), amount);
    }

    pub fn balance_of(&self, account: AccountId, currency: &str) -> Decimal {
        self.state
            .lock()
            .book
            .balances
            .get(&(account, currency.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn add_instrument(&self, meta: InstrumentMeta) {
        self.instruments.write().insert(meta.symbol.clone(), meta);
    }

    pub fn add_order(&self, order: Order) -> OrderId {
        let id = order.id;
        self.state.lock().book.orders.insert(id, order);
        id
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.lock().book.orders.get(&id).cloned()
    }

    pub fn find_contract(&self, id: ContractId) -> Option<Contract> {
        self.state.lock().book.contracts.get(&id).cloned()
    }

    pub fn contracts_for_account(&self, account: AccountId) -> Vec<Contract> {
        self.state.lock().book.contracts_where(|c| c.account_id == account)
    }

    pub fn all_contracts(&self) -> Vec<Contract> {
        self.state.lock().book.contracts_where(|_| true)
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.state.lock().transactions.clone()
    }

    pub fn lp_routes(&self) -> Vec<LpRoute> {
        self.state.lock().lp_routes.clone()
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    pub fn order_locks(&self) -> &OrderLocks {
        &self.locks
    }

    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.lock().contains(&fault)
    }
}

impl InstrumentCatalog for MemoryLedger {
    fn instrument(&self, symbol: &str) -> Option<InstrumentMeta> {
        self.instruments.read().get(symbol).cloned()
    }
}

impl ExposureSource for MemoryLedger {
    fn net_exposure(&self, symbol: &str) -> Result<Decimal, LedgerError> {
        if self.has_fault(Fault::ExposureRead) {
            return Err(LedgerError::Unavailable("exposure query failed".to_string()));
        }
        Ok(self.state.lock().book.exposure(Some(symbol)))
    }

    fn total_net_exposure(&self) -> Result<Decimal, LedgerError> {
        if self.has_fault(Fault::ExposureRead) {
            return Err(LedgerError::Unavailable("exposure query failed".to_string()));
        }
        Ok(self.state.lock().book.exposure(None))
    }
}

impl Ledger for MemoryLedger {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, LedgerError> {
        Ok(Box::new(MemoryTx {
            ledger: self,
            committed: self.state.lock(),
            staged: None,
            transactions: Vec::new(),
            lp_routes: Vec::new(),
            faults: self.faults.lock().clone(),
            inserts: 0,
        }))
    }

    fn lock_order_for_execution(&self, order_id: OrderId) -> Result<OrderLock, LedgerError> {
        self.locks.try_lock(order_id)
    }
}

struct MemoryTx<'a> {
    ledger: &'a MemoryLedger,
    committed: MutexGuard<'a, LedgerState>,
    // None until the first write
    staged: Option<Book>,
    transactions: Vec<TransactionRecord>,
    lp_routes: Vec<LpRoute>,
    faults: Vec<Fault>,
    inserts: usize,
}

impl MemoryTx<'_> {
    fn book(&self) -> &Book {
        self.staged.as_ref().unwrap_or(&self.committed.book)
    }

    fn book_mut(&mut self) -> &mut Book {
        let committed = &self.committed;
        self.staged.get_or_insert_with(|| committed.book.clone())
    }

    fn fail_if(&self, fault: Fault, what: &str) -> Result<(), LedgerError> {
        if self.faults.contains(&fault) {
            return Err(LedgerError::Unavailable(format!("{what} failed")));
        }
        Ok(())
    }
}

impl AccountLedger for MemoryTx<'_> {
    fn account_currency(&self, account: AccountId) -> Result<String, LedgerError> {
        self.book()
            .accounts
            .get(&account)
            .map(|a| a.currency.clone())
            .ok_or_else(|| LedgerError::not_found("account", account))
    }

    fn balance(&self, account: AccountId, currency: &str) -> Result<Quote, LedgerError> {
        Ok(Quote::new(
            self.book()
                .balances
                .get(&(account, currency.to_string()))
                .copied()
                .unwrap_or(Decimal::ZERO),
        ))
    }

    fn debit(
        &mut self,
        account: AccountId,
        currency: &str,
        amount: Quote,
    ) -> Result<Quote, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::Constraint(format!("negative debit {amount}")));
        }
        let slot = self
            .book_mut()
            .balances
            .entry((account, currency.to_string()))
            .or_insert(Decimal::ZERO);
        // conditional update: balance >= amount or nothing changes
        if *slot < amount.value() {
            return Err(LedgerError::InsufficientFunds {
                currency: currency.to_string(),
                required: amount,
                available: Quote::new(*slot),
            });
        }
        *slot -= amount.value();
        Ok(Quote::new(*slot))
    }

    fn credit(
        &mut self,
        account: AccountId,
        currency: &str,
        amount: Quote,
    ) -> Result<Quote, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::Constraint(format!("negative credit {amount}")));
        }
        let slot = self
            .book_mut()
            .balances
            .entry((account, currency.to_string()))
            .or_insert(Decimal::ZERO);
        *slot += amount.value();
        Ok(Quote::new(*slot))
    }
}

impl PositionLedger for MemoryTx<'_> {
    fn insert_contract(&mut self, contract: Contract) -> Result<(), LedgerError> {
        self.inserts += 1;
        self.fail_if(Fault::ContractInsert { nth: self.inserts }, "contract insert")?;
        let book = self.book_mut();
        if book.contracts.contains_key(&contract.id) {
            return Err(LedgerError::Constraint(format!(
                "duplicate contract {}",
                contract.id
            )));
        }
        book.contracts.insert(contract.id, contract);
        Ok(())
    }

    fn contract(&self, id: ContractId) -> Result<Contract, LedgerError> {
        self.book()
            .contracts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("contract", id))
    }

    fn update_contract(&mut self, contract: &Contract) -> Result<(), LedgerError> {
        self.fail_if(Fault::ContractUpdate(contract.id), "contract update")?;
        let slot = self
            .book_mut()
            .contracts
            .get_mut(&contract.id)
            .ok_or_else(|| LedgerError::not_found("contract", contract.id))?;
        *slot = contract.clone();
        Ok(())
    }

    fn contracts_by_pair(&self, pair_id: PairId) -> Result<Vec<Contract>, LedgerError> {
        Ok(self.book().contracts_where(|c| c.pair_id == Some(pair_id)))
    }

    fn contracts_by_account(&self, account: AccountId) -> Result<Vec<Contract>, LedgerError> {
        Ok(self.book().contracts_where(|c| c.account_id == account))
    }

    fn open_contracts_for_symbol(&self, symbol: &str) -> Result<Vec<Contract>, LedgerError> {
        Ok(self.book().contracts_where(|c| {
            c.is_open() && c.symbol == symbol && c.liquidation_price.is_some()
        }))
    }
}

impl OrderLedger for MemoryTx<'_> {
    fn load_execution_context(&self, order_id: OrderId) -> Result<ExecutionContext, LedgerError> {
        let order = self
            .book()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("order", order_id))?;
        let account_currency = self.account_currency(order.account_id)?;
        let instrument = self
            .ledger
            .instrument(&order.symbol)
            .ok_or_else(|| LedgerError::not_found("instrument", &order.symbol))?;
        Ok(ExecutionContext {
            order,
            account_currency,
            instrument,
        })
    }

    fn update_order(&mut self, order: &Order) -> Result<(), LedgerError> {
        let slot = self
            .book_mut()
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| LedgerError::not_found("order", order.id))?;
        *slot = order.clone();
        Ok(())
    }
}

impl AuditLedger for MemoryTx<'_> {
    fn record_transaction(&mut self, record: TransactionRecord) -> Result<(), LedgerError> {
        self.transactions.push(record);
        Ok(())
    }

    fn record_lp_route(&mut self, route: LpRoute) -> Result<(), LedgerError> {
        self.lp_routes.push(route);
        Ok(())
    }

    fn next_number(&mut self, kind: NumberKind) -> Result<String, LedgerError> {
        let book = self.book_mut();
        let counter = match kind {
            NumberKind::Contract => &mut book.contract_seq,
            NumberKind::Transaction => &mut book.transaction_seq,
        };
        *counter += 1;
        Ok(format!("{}-{:06}", kind.prefix(), counter))
    }
}

impl ExposureSource for MemoryTx<'_> {
    fn net_exposure(&self, symbol: &str) -> Result<Decimal, LedgerError> {
        self.fail_if(Fault::ExposureRead, "exposure query")?;
        Ok(self.book().exposure(Some(symbol)))
    }

    fn total_net_exposure(&self) -> Result<Decimal, LedgerError> {
        self.fail_if(Fault::ExposureRead, "exposure query")?;
        Ok(self.book().exposure(None))
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        if self.faults.contains(&Fault::Commit) {
            return Err(LedgerError::Unavailable("commit failed".to_string()));
        }
        let MemoryTx {
            mut committed,
            staged,
            transactions,
            lp_routes,
            ..
        } = *self;
        if let Some(book) = staged {
            committed.book = book;
        }
        committed.transactions.extend(transactions);
        committed.lp_routes.extend(lp_routes);
        Ok(())
    }
}
