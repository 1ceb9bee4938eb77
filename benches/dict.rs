use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::distributions::{Distribution, Standard};
use rand::{Rng, SeedableRng};
use ton_cells::cell::*;
use ton_cells::dict::*;

fn random_entries<K, V>(num_elements: usize) -> Vec<(K, V)>
where
    Standard: Distribution<K> + Distribution<V>,
{
    let mut rng = rand_xorshift::XorShiftRng::from_seed([0u8; 16]);
    (0..num_elements)
        .map(|_| (rng.gen::<K>(), rng.gen::<V>()))
        .collect()
}

fn build_dict_impl<K, V>(id: BenchmarkId, num_elements: usize, c: &mut Criterion)
where
    Standard: Distribution<K> + Distribution<V>,
    K: Store + DictKey,
    V: Store,
{
    let values = random_entries::<K, V>(num_elements);

    c.bench_with_input(id, &values, |b, values| {
        b.iter(|| {
            let mut result = Dict::<K, V>::new();
            for (key, value) in values {
                result.set(key, value).unwrap();
            }
            black_box(result);
        });
    });
}

fn build_sorted_dict_impl<K, V>(id: BenchmarkId, num_elements: usize, c: &mut Criterion)
where
    Standard: Distribution<K> + Distribution<V>,
    K: Store + DictKey + Ord,
    V: Store,
{
    let values = random_entries::<K, V>(num_elements)
        .into_iter()
        .collect::<BTreeMap<K, V>>();

    c.bench_with_input(id, &values, |b, values| {
        b.iter(|| {
            let result = Dict::<K, V>::try_from_btree(values).unwrap();
            black_box(result);
        });
    });
}

fn get_dict_impl<K, V>(id: BenchmarkId, num_elements: usize, c: &mut Criterion)
where
    Standard: Distribution<K> + Distribution<V>,
    K: Store + DictKey + Ord,
    for<'a> V: Store + Load<'a>,
{
    let values = random_entries::<K, V>(num_elements)
        .into_iter()
        .collect::<BTreeMap<K, V>>();
    let dict = Dict::<K, V>::try_from_btree(&values).unwrap();

    c.bench_with_input(id, &values, |b, values| {
        b.iter(|| {
            for key in values.keys() {
                black_box(dict.get(key).unwrap());
            }
        });
    });
}

fn dict_group(c: &mut Criterion) {
    macro_rules! decl_dict_benches {
        ($({ $n:literal, $k:ty, $v:ident }),*$(,)?) => {
            $({
                let params = format!(
                    "size={}; key={}; value={}",
                    $n, stringify!($k), stringify!($v)
                );
                build_dict_impl::<$k, $v>(BenchmarkId::new("build_dict", &params), $n, c);
                build_sorted_dict_impl::<$k, $v>(
                    BenchmarkId::new("build_dict_sorted", &params),
                    $n,
                    c,
                );
                get_dict_impl::<$k, $v>(BenchmarkId::new("get_dict", &params), $n, c);
            });*
        };
    }

    decl_dict_benches![
        { 10, u8, u64 },
        { 256, u8, u64 },

        { 10, u16, u64 },
        { 1000, u16, u64 },

        { 10, u32, u64 },
        { 1000, u32, u64 },
        { 100000, u32, u64 },

        { 10, u64, u64 },
        { 1000, u64, u64 },
        { 100000, u64, u64 },
    ];
}

criterion_group!(dict, dict_group);
criterion_main!(dict);
