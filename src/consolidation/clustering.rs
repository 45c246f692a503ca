//! Clustering engine: density-based DBSCAN (the default) and K-means.
//! DBSCAN's neighborhood test runs on Euclidean distance over
//! unit-normalized vectors, per spec; k-means assignment runs on cosine
//! distance, and the final per-cluster `avg_distance` is always true
//! (unnormalized) Euclidean distance from members to centroid.

use crate::embeddings::cosine_similarity;

/// One discovered cluster.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub label: usize,
    pub member_ids: Vec<String>,
    pub centroid: Vec<f32>,
    pub avg_distance: f32,
}

/// A point to be clustered: an id paired with its embedding.
#[derive(Debug, Clone)]
pub struct ClusterPoint {
    pub id: String,
    pub vector: Vec<f32>,
}

fn distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        v.to_vec()
    } else {
        v.iter().map(|x| (*x as f64 / norm) as f32).collect()
    }
}

/// DBSCAN over Euclidean distance between unit-normalized vectors. Points
/// that end up in no dense-enough neighborhood are simply omitted from the
/// returned clusters (noise).
#[must_use]
pub fn dbscan(points: &[ClusterPoint], epsilon: f64, min_cluster_size: usize) -> Vec<Cluster> {
    const UNVISITED: i64 = -1;
    const NOISE: i64 = -2;

    let n = points.len();
    if n == 0 {
        return Vec::new();
    }
    let mut labels = vec![UNVISITED; n];
    let mut next_label = 0i64;

    let normalized: Vec<Vec<f32>> = points.iter().map(|p| normalize(&p.vector)).collect();
    let region_query = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| euclidean_distance(&normalized[i], &normalized[j]) <= epsilon)
            .collect()
    };

    for i in 0..n {
        if labels[i] != UNVISITED {
            continue;
        }
        let neighbors = region_query(i);
        if neighbors.len() < min_cluster_size {
            labels[i] = NOISE;
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[i] = label;

        let mut seeds = neighbors;
        let mut idx = 0;
        while idx < seeds.len() {
            let q = seeds[idx];
            idx += 1;
            if labels[q] == NOISE {
                labels[q] = label;
            }
            if labels[q] != UNVISITED {
                continue;
            }
            labels[q] = label;
            let q_neighbors = region_query(q);
            if q_neighbors.len() >= min_cluster_size {
                seeds.extend(q_neighbors);
            }
        }
    }

    build_clusters(points, &labels, next_label as usize)
}

/// Lloyd's k-means over cosine distance, with cyclic initialization (the
/// `i % k`-th point seeds centroid `i % k`) and a fixed iteration cap.
#[must_use]
pub fn kmeans(points: &[ClusterPoint], k: usize, max_iterations: usize) -> Vec<Cluster> {
    let n = points.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let k = k.min(n);
    let dims = points[0].vector.len();

    let mut centroids: Vec<Vec<f64>> = (0..k)
        .map(|c| points[c].vector.iter().map(|&v| v as f64).collect())
        .collect();
    let mut assignment = vec![0usize; n];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let centroid_f32: Vec<f32> = centroid.iter().map(|&v| v as f32).collect();
                let d = distance(&point.vector, &centroid_f32);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            if assignment[i] != best {
                changed = true;
                assignment[i] = best;
            }
        }

        let mut sums = vec![vec![0.0f64; dims]; k];
        let mut counts = vec![0usize; k];
        for (i, point) in points.iter().enumerate() {
            let cluster = assignment[i];
            counts[cluster] += 1;
            for (d, v) in point.vector.iter().enumerate() {
                sums[cluster][d] += *v as f64;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            for d in 0..dims {
                centroids[c][d] = sums[c][d] / counts[c] as f64;
            }
        }

        if !changed {
            break;
        }
    }

    let labels: Vec<i64> = assignment.iter().map(|&a| a as i64).collect();
    build_clusters(points, &labels, k)
}

fn build_clusters(points: &[ClusterPoint], labels: &[i64], label_count: usize) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    for label in 0..label_count {
        let members: Vec<&ClusterPoint> = points
            .iter()
            .zip(labels)
            .filter(|(_, &l)| l == label as i64)
            .map(|(p, _)| p)
            .collect();
        if members.is_empty() {
            continue;
        }
        let dims = members[0].vector.len();
        let mut centroid_f64 = vec![0.0f64; dims];
        for member in &members {
            for (d, v) in member.vector.iter().enumerate() {
                centroid_f64[d] += *v as f64;
            }
        }
        for v in &mut centroid_f64 {
            *v /= members.len() as f64;
        }
        let centroid: Vec<f32> = centroid_f64.iter().map(|&v| v as f32).collect();

        let avg_distance = members
            .iter()
            .map(|m| euclidean_distance(&m.vector, &centroid))
            .sum::<f64>()
            / members.len() as f64;

        clusters.push(Cluster {
            label,
            member_ids: members.iter().map(|m| m.id.clone()).collect(),
            centroid,
            avg_distance: avg_distance as f32,
        });
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, v: Vec<f32>) -> ClusterPoint {
        ClusterPoint { id: id.to_string(), vector: v }
    }

    #[test]
    fn dbscan_groups_tight_points_and_excludes_noise() {
        let points = vec![
            point("a", vec![1.0, 0.0]),
            point("b", vec![0.99, 0.01]),
            point("c", vec![0.98, 0.02]),
            point("z", vec![0.0, 1.0]),
        ];
        let clusters = dbscan(&points, 0.05, 3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_ids.len(), 3);
        assert!(!clusters[0].member_ids.contains(&"z".to_string()));
    }

    #[test]
    fn kmeans_separates_two_well_separated_blobs() {
        let points = vec![
            point("a1", vec![1.0, 0.0]),
            point("a2", vec![0.95, 0.05]),
            point("b1", vec![0.0, 1.0]),
            point("b2", vec![0.05, 0.95]),
        ];
        let clusters = kmeans(&points, 2, 50);
        assert_eq!(clusters.len(), 2);
        let total_members: usize = clusters.iter().map(|c| c.member_ids.len()).sum();
        assert_eq!(total_members, 4);
    }

    #[test]
    fn dbscan_on_empty_input_returns_no_clusters() {
        assert!(dbscan(&[], 0.1, 2).is_empty());
    }
}
