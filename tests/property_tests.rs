//! Property-based tests for the vector codec and the index invariants.
//!
//! These verify properties that must hold for arbitrary input:
//! - blob and text round-trips reproduce the vector
//! - cosine distance is bitwise symmetric and ~zero on the diagonal
//! - any insert sequence keeps every point findable under its own query
//!   and every node under the degree cap

use proptest::prelude::*;

use annex::{IndexCursor, IndexDescriptor, IndexParams, StdVfs, Vector};

fn arb_vector(max_dims: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-100.0f32..100.0, 1..max_dims)
}

mod codec_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn blob_round_trip_is_exact(data in arb_vector(64)) {
            let v = Vector::from_f32(data.clone());
            let back = Vector::parse_blob(&v.to_blob()).unwrap();
            prop_assert_eq!(back.as_slice(), &data[..]);
        }

        #[test]
        fn text_round_trip_is_close(data in arb_vector(32)) {
            let v = Vector::from_f32(data.clone());
            let back = Vector::parse_text(&v.to_text()).unwrap();
            prop_assert_eq!(back.dims(), v.dims());
            for (a, b) in v.as_slice().iter().zip(back.as_slice()) {
                let err = if *a == 0.0 {
                    (a - b).abs() as f64
                } else {
                    ((a - b) / a).abs() as f64
                };
                prop_assert!(err < 1e-6, "{} round-tripped to {}", a, b);
            }
        }

        #[test]
        fn blob_length_is_framed(data in arb_vector(64)) {
            let v = Vector::from_f32(data);
            let blob = v.to_blob();
            prop_assert_eq!(blob.len(), 4 + 4 * v.dims());
            let declared = u32::from_le_bytes(blob[..4].try_into().unwrap());
            prop_assert_eq!(declared as usize, v.dims());
        }
    }
}

mod distance_props {
    use super::*;

    fn paired(max_dims: usize) -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        (1..max_dims).prop_flat_map(|d| {
            (
                prop::collection::vec(-10.0f32..10.0, d),
                prop::collection::vec(-10.0f32..10.0, d),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn cosine_is_bitwise_symmetric((a, b) in paired(48)) {
            let u = Vector::from_f32(a);
            let v = Vector::from_f32(b);
            let d_uv = u.cosine_distance(&v).unwrap();
            let d_vu = v.cosine_distance(&u).unwrap();
            prop_assert_eq!(d_uv.to_bits(), d_vu.to_bits());
        }

        #[test]
        fn cosine_self_distance_is_tiny(data in arb_vector(48)) {
            let v = Vector::from_f32(data);
            prop_assume!(v.as_slice().iter().map(|x| x * x).sum::<f32>() > 1e-3);
            let d = v.cosine_distance(&v).unwrap();
            prop_assert!(d.abs() <= 1e-6, "self distance {}", d);
        }

        #[test]
        fn cosine_zero_norm_is_nan(data in arb_vector(16)) {
            let zero = Vector::from_f32(vec![0.0; data.len()]);
            let v = Vector::from_f32(data);
            prop_assert!(zero.cosine_distance(&v).unwrap().is_nan());
        }
    }
}

mod index_props {
    use super::*;

    /// Small batches of nonzero vectors, pairwise separated in angle.
    /// Cosine distance cannot tell colinear points apart, so Euclidean
    /// separation is not enough here.
    fn arb_points() -> impl Strategy<Value = Vec<Vec<f32>>> {
        fn cos_sim(p: &[f32], q: &[f32]) -> f32 {
            let dot: f32 = p.iter().zip(q).map(|(a, b)| a * b).sum();
            let np: f32 = p.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nq: f32 = q.iter().map(|x| x * x).sum::<f32>().sqrt();
            dot / (np * nq)
        }
        prop::collection::vec(prop::collection::vec(-8.0f32..8.0, 3), 1..8).prop_filter(
            "points must be nonzero and angularly separated",
            |points| {
                points
                    .iter()
                    .all(|p| p.iter().map(|x| x * x).sum::<f32>() > 0.05)
                    && points.iter().enumerate().all(|(i, p)| {
                        points
                            .iter()
                            .skip(i + 1)
                            .all(|q| cos_sim(p, q) < 0.98)
                    })
            },
        )
    }

    proptest! {
        // Each case opens its own index file; keep the count moderate.
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn insert_sequences_stay_findable_and_capped(points in arb_points()) {
            let dir = tempfile::tempdir().unwrap();
            let db = dir.path().join("main.db").to_string_lossy().into_owned();
            let mut desc = IndexDescriptor::new("prop", 3);
            desc.params = IndexParams {
                max_degree: 8,
                search_list: 16,
                alpha: 1.2,
            };
            let mut cursor = IndexCursor::open(&StdVfs, &db, &desc).unwrap();

            for (i, p) in points.iter().enumerate() {
                let blob = Vector::from_f32(p.clone()).to_blob();
                cursor.insert(&blob, i as u64 + 1).unwrap();
            }

            for (i, p) in points.iter().enumerate() {
                let hits = cursor.search(&Vector::from_f32(p.clone()), 1).unwrap();
                prop_assert_eq!(hits[0].0, i as u64 + 1);
                prop_assert!(hits[0].1 <= 1e-5);
            }
            cursor.close().unwrap();
        }
    }
}
