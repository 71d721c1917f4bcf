//! Cycle collector for reference-counted script objects.
//!
//! Reference counting frees almost everything. The collector only exists
//! for objects kept alive by reference cycles, and works like this:
//!
//! 1. Destroy garbage: drop objects whose only reference is the collector's.
//! 2. Clear counters: snapshot the reference count of every tracked object.
//! 3. Count references: enumerate the references each tracked object holds
//!    to other tracked objects.
//! 4. Mark live objects: an object whose count exceeds the references found
//!    inside the tracked set is held from outside; so is everything it
//!    reaches.
//! 5. Verify unmarked: an unmarked object whose count changed since the
//!    snapshot gained a reference meanwhile and is kept.
//! 6. Break circular references: report each remaining object, make it
//!    release its references, and let it go.
//!
//! No lock is held while host behaviours or callbacks run, or while objects
//! are dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use angelscript_core::{Behaviour, GCFlags};

use crate::core::engine::Engine;
use crate::core::script_object::ScriptObject;
use crate::core::typeinfo::TypeInfo;
use crate::types::script_value::Value;

/// New objects become old after surviving this many destroy passes.
const PROMOTION_THRESHOLD: u32 = 2;

/// Counters reported through `get_gc_statistics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStatistics {
    /// Objects currently tracked.
    pub current_size: u32,
    pub total_destroyed: u32,
    /// Objects found in unreachable cycles.
    pub total_detected: u32,
    /// Objects in the new generation.
    pub new_objects: u32,
    /// Objects destroyed while still in the new generation.
    pub total_new_destroyed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GcState {
    Idle,
    DestroyGarbage,
    ClearCounters,
    CountReferences,
    MarkLiveObjects,
    VerifyUnmarked,
    BreakCircularRefs,
}

struct GcEntry {
    object: ScriptObject,
    survived: u32,
}

/// Working set of one detection pass.
#[derive(Default)]
struct Detection {
    objects: Vec<ScriptObject>,
    index: FxHashMap<usize, usize>,
    snapshot: Vec<usize>,
    internal: Vec<usize>,
    edges: Vec<Vec<usize>>,
    live: Vec<bool>,
}

impl Detection {
    /// References held by the detection itself and by the collector's entry.
    const OWN_REFS: usize = 2;
}

#[derive(Default)]
struct Generations {
    young: Vec<GcEntry>,
    old: Vec<GcEntry>,
}

pub(crate) struct GarbageCollector {
    generations: Mutex<Generations>,
    state: Mutex<GcState>,
    detection: Mutex<Option<Detection>>,
    stats: Mutex<GcStatistics>,
    running: AtomicBool,
    /// Sink filled by `gc_enum_callback` while a host type enumerates.
    enum_sink: Mutex<Option<Vec<ScriptObject>>>,
}

impl GarbageCollector {
    pub(crate) fn new() -> Self {
        Self {
            generations: Mutex::new(Generations::default()),
            state: Mutex::new(GcState::Idle),
            detection: Mutex::new(None),
            stats: Mutex::new(GcStatistics::default()),
            running: AtomicBool::new(false),
            enum_sink: Mutex::new(None),
        }
    }

    pub(crate) fn add_object(&self, object: &ScriptObject) {
        self.generations.lock().young.push(GcEntry {
            object: object.clone(),
            survived: 0,
        });
    }

    pub(crate) fn new_object_count(&self) -> usize {
        self.generations.lock().young.len()
    }

    pub(crate) fn statistics(&self) -> GcStatistics {
        let generations = self.generations.lock();
        let mut stats = *self.stats.lock();
        stats.current_size = (generations.young.len() + generations.old.len()) as u32;
        stats.new_objects = generations.young.len() as u32;
        stats
    }

    /// Tracked object at `index`, new generation first.
    pub(crate) fn object_at(&self, index: u32) -> Option<(u32, ScriptObject, TypeInfo)> {
        let generations = self.generations.lock();
        generations
            .young
            .iter()
            .chain(&generations.old)
            .nth(index as usize)
            .map(|e| (index, e.object.clone(), e.object.get_object_type()))
    }

    /// Run the collector. Returns 1 while a stepped cycle is still in
    /// progress and 0 once it has completed.
    pub(crate) fn collect(&self, engine: &Engine, flags: GCFlags) -> i32 {
        if self.running.swap(true, Ordering::AcqRel) {
            // re-entered from a behaviour or callback
            return 0;
        }
        let mut flags = flags;
        if !flags.intersects(GCFlags::DESTROY_GARBAGE | GCFlags::DETECT_GARBAGE) {
            flags |= GCFlags::DESTROY_GARBAGE | GCFlags::DETECT_GARBAGE;
        }
        let result = if flags.contains(GCFlags::ONE_STEP) && !flags.contains(GCFlags::FULL_CYCLE) {
            self.step(engine, flags);
            i32::from(*self.state.lock() != GcState::Idle)
        } else {
            // finish any stepped cycle, then run a complete one
            if *self.state.lock() != GcState::Idle {
                while self.step(engine, flags) {}
            }
            self.step(engine, flags);
            while self.step(engine, flags) {}
            if flags.contains(GCFlags::DETECT_GARBAGE) {
                // the broken cycles are trivial garbage now
                self.destroy_garbage();
            }
            0
        };
        self.running.store(false, Ordering::Release);
        tracing::debug!(flags = flags.bits(), stats = ?self.statistics(), "garbage collection");
        result
    }

    /// Execute one phase. Returns `false` once the collector is idle again.
    fn step(&self, engine: &Engine, flags: GCFlags) -> bool {
        let state = *self.state.lock();
        let next = match state {
            GcState::Idle => {
                if flags.contains(GCFlags::DESTROY_GARBAGE) {
                    GcState::DestroyGarbage
                } else {
                    GcState::ClearCounters
                }
            }
            GcState::DestroyGarbage => {
                self.destroy_garbage();
                if flags.contains(GCFlags::DETECT_GARBAGE) {
                    GcState::ClearCounters
                } else {
                    GcState::Idle
                }
            }
            GcState::ClearCounters => {
                self.clear_counters();
                GcState::CountReferences
            }
            GcState::CountReferences => {
                self.count_references(engine);
                GcState::MarkLiveObjects
            }
            GcState::MarkLiveObjects => {
                self.mark_live_objects();
                GcState::VerifyUnmarked
            }
            GcState::VerifyUnmarked => {
                self.verify_unmarked();
                GcState::BreakCircularRefs
            }
            GcState::BreakCircularRefs => {
                self.break_circular_refs(engine);
                GcState::Idle
            }
        };
        *self.state.lock() = next;
        next != GcState::Idle
    }

    fn destroy_garbage(&self) {
        let mut garbage = Vec::new();
        let mut new_destroyed = 0u32;
        {
            let mut generations = self.generations.lock();
            let young = std::mem::take(&mut generations.young);
            for mut entry in young {
                if entry.object.ref_count() == 1 {
                    new_destroyed += 1;
                    garbage.push(entry.object);
                } else {
                    entry.survived += 1;
                    if entry.survived >= PROMOTION_THRESHOLD {
                        generations.old.push(entry);
                    } else {
                        generations.young.push(entry);
                    }
                }
            }
            let old = std::mem::take(&mut generations.old);
            let (dead, kept): (Vec<_>, Vec<_>) =
                old.into_iter().partition(|e| e.object.ref_count() == 1);
            generations.old = kept;
            garbage.extend(dead.into_iter().map(|e| e.object));
        }
        {
            let mut stats = self.stats.lock();
            stats.total_destroyed += garbage.len() as u32;
            stats.total_new_destroyed += new_destroyed;
        }
        // destruction may cascade into other tracked objects
        drop(garbage);
    }

    fn clear_counters(&self) {
        let objects: Vec<ScriptObject> = {
            let generations = self.generations.lock();
            generations
                .young
                .iter()
                .chain(&generations.old)
                .map(|e| e.object.clone())
                .collect()
        };
        let index = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.as_ptr() as usize, i))
            .collect();
        let snapshot = objects.iter().map(ScriptObject::ref_count).collect();
        let count = objects.len();
        *self.detection.lock() = Some(Detection {
            objects,
            index,
            snapshot,
            internal: vec![0; count],
            edges: vec![Vec::new(); count],
            live: vec![false; count],
        });
    }

    fn count_references(&self, engine: &Engine) {
        let Some(mut detection) = self.detection.lock().take() else {
            return;
        };
        for i in 0..detection.objects.len() {
            let refs = self.references_of(engine, &detection.objects[i]);
            for target in refs {
                if let Some(&j) = detection.index.get(&(target.as_ptr() as usize)) {
                    detection.internal[j] += 1;
                    detection.edges[i].push(j);
                }
            }
        }
        *self.detection.lock() = Some(detection);
    }

    fn mark_live_objects(&self) {
        let mut guard = self.detection.lock();
        let Some(detection) = guard.as_mut() else {
            return;
        };
        let mut pending = Vec::new();
        for i in 0..detection.objects.len() {
            let external = detection.snapshot[i]
                .saturating_sub(Detection::OWN_REFS)
                .saturating_sub(detection.internal[i]);
            if external > 0 {
                detection.live[i] = true;
                pending.push(i);
            }
        }
        while let Some(i) = pending.pop() {
            for j in std::mem::take(&mut detection.edges[i]) {
                if !detection.live[j] {
                    detection.live[j] = true;
                    pending.push(j);
                }
            }
        }
    }

    fn verify_unmarked(&self) {
        let mut guard = self.detection.lock();
        let Some(detection) = guard.as_mut() else {
            return;
        };
        let changed = (0..detection.objects.len())
            .any(|i| !detection.live[i] && detection.objects[i].ref_count() != detection.snapshot[i]);
        if changed {
            // a reference moved while counting; try again next cycle
            detection.live.iter_mut().for_each(|l| *l = true);
        }
    }

    fn break_circular_refs(&self, engine: &Engine) {
        let Some(detection) = self.detection.lock().take() else {
            return;
        };
        let garbage: Vec<ScriptObject> = detection
            .objects
            .iter()
            .zip(&detection.live)
            .filter(|(_, live)| !**live)
            .map(|(o, _)| o.clone())
            .collect();
        drop(detection);
        if garbage.is_empty() {
            return;
        }
        tracing::debug!(count = garbage.len(), "breaking reference cycles");
        let callback = engine.0.callbacks.circular_ref_callback();
        if let Some(callback) = &callback {
            for object in &garbage {
                callback(&object.get_object_type(), object);
            }
        }
        for object in &garbage {
            let released = self.release_references(engine, object);
            drop(released);
        }
        self.stats.lock().total_detected += garbage.len() as u32;
    }

    /// Objects directly referenced by `object`: script properties, or what
    /// the type's EnumRefs behaviour reports.
    fn references_of(&self, engine: &Engine, object: &ScriptObject) -> Vec<ScriptObject> {
        let object_type = object.get_object_type();
        match object_type.behaviour(Behaviour::EnumRefs) {
            Some(behaviour) => {
                let previous = self.enum_sink.lock().replace(Vec::new());
                engine.call_behaviour(&behaviour, object);
                let found = self.enum_sink.lock().take().unwrap_or_default();
                *self.enum_sink.lock() = previous;
                found
            }
            None => {
                let mut out = Vec::new();
                object.enum_references(&mut out);
                out
            }
        }
    }

    /// Make `object` drop every reference it holds. Returns the released
    /// values for the caller to drop.
    fn release_references(&self, engine: &Engine, object: &ScriptObject) -> Vec<Value> {
        match object.get_object_type().behaviour(Behaviour::ReleaseRefs) {
            Some(behaviour) => {
                engine.call_behaviour(&behaviour, object);
                Vec::new()
            }
            None => object.release_all_handles(),
        }
    }

    /// Record a reference reported by a host EnumRefs behaviour.
    pub(crate) fn enum_callback(&self, reference: &ScriptObject) {
        if let Some(sink) = self.enum_sink.lock().as_mut() {
            sink.push(reference.clone());
        }
    }

    pub(crate) fn forward_enum_references(&self, engine: &Engine, object: &ScriptObject) {
        let found = self.references_of(engine, object);
        for reference in &found {
            self.enum_callback(reference);
        }
    }

    pub(crate) fn forward_release_references(&self, engine: &Engine, object: &ScriptObject) {
        let released = self.release_references(engine, object);
        drop(released);
    }

    /// Release every tracked object, breaking any cycle among them.
    pub(crate) fn clear(&self, engine: Option<&Engine>) {
        if let Some(engine) = engine {
            self.collect(engine, GCFlags::FULL_CYCLE);
        }
        let entries = {
            let mut generations = self.generations.lock();
            let mut all = std::mem::take(&mut generations.young);
            all.append(&mut generations.old);
            all
        };
        let mut released = Vec::new();
        for entry in &entries {
            released.extend(entry.object.release_all_handles());
        }
        drop(released);
        drop(entries);
        *self.detection.lock() = None;
        *self.state.lock() = GcState::Idle;
    }
}
