// fuzz.rs — randomized operation sequences over small generated maps
//
// Builds maps of a few box-hulled models (with deliberate cross-model
// sharing), then runs random split / compact / delete / synthesize
// sequences, checking every cross-reference after each step.

use crate::bspfile::{Contents, Model, MAX_MAP_HULLS};
use crate::hulls::{regenerate_model_hulls, synthesize_box_hull};
use crate::remap::{compact, delete_model};
use crate::split::split_shared;
use crate::store::MapStore;
use crate::usage::{mark, UsageSet};
use bsped_common::math::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_bounds(rng: &mut StdRng) -> (Vec3, Vec3) {
    let mut mins = [0.0f32; 3];
    let mut maxs = [0.0f32; 3];
    for i in 0..3 {
        let center = rng.gen_range(-512.0f32..512.0);
        let half = rng.gen_range(8.0f32..64.0);
        mins[i] = (center - half).round();
        maxs[i] = (center + half).round();
    }
    (mins, maxs)
}

fn random_map(rng: &mut StdRng) -> MapStore {
    let mut store = MapStore::empty();

    let n_models = rng.gen_range(1..5usize);
    let mut models = store.models().to_vec();
    for _ in 1..n_models {
        models.push(Model {
            mins: [0.0; 3],
            maxs: [8.0; 3],
            origin: [0.0; 3],
            head_nodes: [-1; MAX_MAP_HULLS],
            vis_leafs: 0,
            first_face: 0,
            num_faces: 0,
        });
    }
    store.set_models(models);

    for m in 0..n_models {
        let (mins, maxs) = random_bounds(rng);
        let mut models = store.models().to_vec();
        models[m].mins = mins;
        models[m].maxs = maxs;
        store.set_models(models);

        for hull in 1..MAX_MAP_HULLS {
            if rng.gen_bool(0.8) {
                let root = synthesize_box_hull(&mut store, &mins, &maxs, hull);
                let mut models = store.models().to_vec();
                models[m].head_nodes[hull] = root as i32;
                store.set_models(models);
            }
        }
    }

    // compiler-style dedup: some models reuse an earlier model's clip tree
    let mut models = store.models().to_vec();
    for b in 1..models.len() {
        if rng.gen_bool(0.5) {
            let a = rng.gen_range(0..b);
            for hull in 1..MAX_MAP_HULLS {
                if models[a].head_nodes[hull] >= 0 && rng.gen_bool(0.5) {
                    models[b].head_nodes[hull] = models[a].head_nodes[hull];
                }
            }
        }
    }
    store.set_models(models);
    store
}

fn keep_all_models(store: &MapStore) -> UsageSet {
    let mut keep = UsageSet::sized_to(store);
    for i in 0..store.models().len() {
        keep.union_with(&mark(store, i, false, false).expect("generated maps are acyclic"));
    }
    keep
}
