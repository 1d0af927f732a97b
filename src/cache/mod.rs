//! LRU cache of compiled expressions keyed by structural hash.
//!
//! Entries live in a slot arena. Each slot is linked into a singly linked
//! bucket chain (for lookup) and a doubly linked recency list (head = most
//! recently used), both by index. Pure results can be memoized per entry and
//! are dropped when a variable the expression reads changes.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ast::Expr;
use crate::ast::hash::{dependencies, fnv1a, structural_key};
use crate::compiler::CompiledExpr;
use crate::value::Value;

pub mod global;

pub const DEFAULT_CAPACITY: usize = 1024;
const MIN_BUCKETS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub buckets: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entries:   {} / {}", self.entries, self.capacity)?;
        writeln!(f, "buckets:   {}", self.buckets)?;
        writeln!(f, "hits:      {}", self.hits)?;
        writeln!(f, "misses:    {}", self.misses)?;
        writeln!(f, "evictions: {}", self.evictions)?;
        write!(f, "hit rate:  {:.2}%", self.hit_rate * 100.0)
    }
}

struct Entry {
    key: u64,
    program: Arc<CompiledExpr>,
    memo: Option<Value>,
    last_access: u64,
    access_count: u64,
    /// FNV-1a hashes of the variable names the expression reads.
    deps: Vec<u64>,
    bucket_next: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct ExprCache {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    buckets: Vec<Option<usize>>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    capacity: usize,
    clock: u64,
    /// Bumped by every invalidation, so a result computed across one is
    /// not memoized.
    generation: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for ExprCache {
    fn default() -> Self {
        ExprCache::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for ExprCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprCache").field("len", &self.len).field("capacity", &self.capacity).finish()
    }
}

impl ExprCache {
    pub fn new(capacity: usize) -> Self {
        let buckets = (capacity / 4).next_power_of_two().max(MIN_BUCKETS);
        ExprCache {
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; buckets],
            head: None,
            tail: None,
            len: 0,
            capacity,
            clock: 0,
            generation: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Compiled program for a structurally identical expression, if cached.
    pub fn lookup(&mut self, expr: &Expr) -> Option<Arc<CompiledExpr>> {
        let key = structural_key(expr);
        match self.find(key) {
            Some(idx) => {
                self.hits += 1;
                self.touch(idx);
                tracing::trace!(key = format_args!("{key:016x}"), "cache hit");
                self.entry(idx).map(|e| Arc::clone(&e.program))
            }
            None => {
                self.misses += 1;
                tracing::trace!(key = format_args!("{key:016x}"), "cache miss");
                None
            }
        }
    }

    /// Memoized result of a pure expression. Only a present memo counts as a
    /// hit; absence is left for the following `lookup` to count.
    pub fn get_memoized_result(&mut self, expr: &Expr) -> Option<Value> {
        let idx = self.find(structural_key(expr))?;
        let memo = self.entry(idx)?.memo.clone()?;
        self.hits += 1;
        self.touch(idx);
        Some(memo)
    }

    /// Attach a result to an existing entry. Ignored when the expression is
    /// not cached.
    pub fn store_result(&mut self, expr: &Expr, value: Value) {
        if let Some(idx) = self.find(structural_key(expr)) {
            if let Some(e) = self.entry_mut(idx) {
                e.memo = Some(value);
            }
        }
    }

    /// Invalidation generation. Read it before executing and hand it to
    /// [`ExprCache::store_result_if_current`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Like `store_result`, but drops the value when any invalidation ran
    /// since `generation` was read. Returns whether the value was kept.
    pub fn store_result_if_current(&mut self, expr: &Expr, value: Value, generation: u64) -> bool {
        if self.generation != generation {
            tracing::trace!("invalidated during evaluation; result not memoized");
            return false;
        }
        match self.find(structural_key(expr)).and_then(|idx| self.entry_mut(idx)) {
            Some(e) => {
                e.memo = Some(value);
                true
            }
            None => false,
        }
    }

    // ── Insertion ───────────────────────────────────────────────────

    /// Cache a compiled program and return the shared handle to it. At
    /// capacity the least recently used entry is evicted first; with zero
    /// capacity the program is not retained.
    pub fn insert(&mut self, expr: &Expr, program: CompiledExpr) -> Arc<CompiledExpr> {
        let program = Arc::new(program);
        let key = structural_key(expr);

        if let Some(idx) = self.find(key) {
            if let Some(e) = self.entry_mut(idx) {
                e.program = Arc::clone(&program);
                e.memo = None;
            }
            self.touch(idx);
            return program;
        }
        if self.capacity == 0 {
            tracing::debug!("cache capacity is zero; program not retained");
            return program;
        }
        if self.len >= self.capacity {
            self.evict_lru();
        }

        self.clock += 1;
        let bucket = self.bucket_of(key);
        let entry = Entry {
            key,
            program: Arc::clone(&program),
            memo: None,
            last_access: self.clock,
            access_count: 1,
            deps: dependencies(expr),
            bucket_next: self.buckets[bucket],
            prev: None,
            next: self.head,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.buckets[bucket] = Some(idx);
        if let Some(old_head) = self.head {
            if let Some(h) = self.entry_mut(old_head) {
                h.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        self.len += 1;
        program
    }

    // ── Invalidation ────────────────────────────────────────────────

    /// Drop memoized results of every entry that reads `name`. Compiled
    /// programs stay cached.
    pub fn invalidate(&mut self, name: &str) {
        let hash = fnv1a(name);
        self.generation += 1;
        let mut cleared = 0usize;
        for e in self.slots.iter_mut().flatten() {
            if e.deps.contains(&hash) && e.memo.take().is_some() {
                cleared += 1;
            }
        }
        if cleared > 0 {
            tracing::debug!(name, cleared, "invalidated memoized results");
        }
    }

    pub fn invalidate_all(&mut self) {
        self.generation += 1;
        for e in self.slots.iter_mut().flatten() {
            e.memo = None;
        }
        tracing::debug!("invalidated all memoized results");
    }

    /// Remove every entry. Statistics are kept.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.slots.clear();
        self.free.clear();
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    // ── Statistics ──────────────────────────────────────────────────

    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        CacheStats {
            entries: self.len,
            capacity: self.capacity,
            buckets: self.buckets.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate: if total > 0 { self.hits as f64 / total as f64 } else { 0.0 },
        }
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    /// Access count and last-access tick of a cached expression.
    pub fn access_info(&self, expr: &Expr) -> Option<(u64, u64)> {
        let e = self.entry(self.find(structural_key(expr))?)?;
        Some((e.access_count, e.last_access))
    }

    // ── Internals ───────────────────────────────────────────────────

    fn bucket_of(&self, key: u64) -> usize {
        (key as usize) & (self.buckets.len() - 1)
    }

    fn entry(&self, idx: usize) -> Option<&Entry> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, idx: usize) -> Option<&mut Entry> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn find(&self, key: u64) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket_of(key)];
        while let Some(idx) = cursor {
            let e = self.entry(idx)?;
            if e.key == key {
                return Some(idx);
            }
            cursor = e.bucket_next;
        }
        None
    }

    /// Record an access and move the entry to the front of the recency list.
    fn touch(&mut self, idx: usize) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(e) = self.entry_mut(idx) {
            e.last_access = clock;
            e.access_count += 1;
        }
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        let old_head = self.head;
        if let Some(e) = self.entry_mut(idx) {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head.and_then(|h| self.entry_mut(h)) {
            h.prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.entry(idx).map(|e| (e.prev, e.next)) else { return };
        match prev.and_then(|p| self.entry_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.entry_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
    }

    fn evict_lru(&mut self) {
        let Some(idx) = self.tail else { return };
        self.unlink(idx);
        let Some(entry) = self.slots.get_mut(idx).and_then(Option::take) else { return };

        // Unhook from the bucket chain.
        let bucket = self.bucket_of(entry.key);
        if self.buckets[bucket] == Some(idx) {
            self.buckets[bucket] = entry.bucket_next;
        } else {
            let mut cursor = self.buckets[bucket];
            while let Some(c) = cursor {
                let Some(e) = self.entry_mut(c) else { break };
                if e.bucket_next == Some(idx) {
                    e.bucket_next = entry.bucket_next;
                    break;
                }
                cursor = e.bucket_next;
            }
        }

        self.free.push(idx);
        self.len -= 1;
        self.evictions += 1;
        tracing::debug!(key = format_args!("{:016x}", entry.key), "evicted least recently used entry");
    }
}

// ── Shared handle ───────────────────────────────────────────────────

/// Thread-safe cache handle. Every operation is one critical section.
#[derive(Clone, Default)]
pub struct SharedCache(Arc<parking_lot::Mutex<ExprCache>>);

impl SharedCache {
    pub fn new(capacity: usize) -> Self {
        SharedCache(Arc::new(parking_lot::Mutex::new(ExprCache::new(capacity))))
    }

    /// Run several operations under one lock.
    pub fn with<T>(&self, f: impl FnOnce(&mut ExprCache) -> T) -> T {
        f(&mut *self.0.lock())
    }

    pub fn lookup(&self, expr: &Expr) -> Option<Arc<CompiledExpr>> {
        self.0.lock().lookup(expr)
    }

    pub fn get_memoized_result(&self, expr: &Expr) -> Option<Value> {
        self.0.lock().get_memoized_result(expr)
    }

    pub fn store_result(&self, expr: &Expr, value: Value) {
        self.0.lock().store_result(expr, value)
    }

    pub fn generation(&self) -> u64 {
        self.0.lock().generation()
    }

    pub fn store_result_if_current(&self, expr: &Expr, value: Value, generation: u64) -> bool {
        self.0.lock().store_result_if_current(expr, value, generation)
    }

    pub fn insert(&self, expr: &Expr, program: CompiledExpr) -> Arc<CompiledExpr> {
        self.0.lock().insert(expr, program)
    }

    pub fn invalidate(&self, name: &str) {
        self.0.lock().invalidate(name)
    }

    pub fn invalidate_all(&self) {
        self.0.lock().invalidate_all()
    }

    pub fn clear(&self) {
        self.0.lock().clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.0.lock().stats()
    }

    pub fn reset_stats(&self) {
        self.0.lock().reset_stats()
    }

    pub fn ptr_eq(&self, other: &SharedCache) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedCache({:?})", &*self.0.lock())
    }
}
