//! Density clustering of match candidates (DBSCAN).

use crate::geometry::Point;

use super::config::ClusterConfig;

/// Output of [`dbscan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clustering {
    pub clusters: Vec<Vec<Point>>,
    pub noise: Vec<Point>,
}

impl Clustering {
    /// The cluster with the most members; ties go to the earliest.
    pub fn largest(&self) -> Option<&[Point]> {
        self.clusters
            .iter()
            .reduce(|best, c| if c.len() > best.len() { c } else { best })
            .map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

fn neighbours(points: &[Point], i: usize, eps: f64) -> Vec<usize> {
    let p = points[i];
    points
        .iter()
        .enumerate()
        .filter(|&(j, q)| j != i && p.distance(*q) <= eps)
        .map(|(j, _)| j)
        .collect()
}

/// Group `points` into density-connected clusters.
///
/// A point is a core point when at least `min_pts` *other* points lie
/// within `eps`. Clusters grow outward from core points; border points
/// join the first cluster that reaches them; everything else is noise.
pub fn dbscan(points: &[Point], config: &ClusterConfig) -> Clustering {
    let mut labels = vec![Label::Unvisited; points.len()];
    let mut next_cluster = 0;

    for i in 0..points.len() {
        if labels[i] != Label::Unvisited {
            continue;
        }
        let seeds = neighbours(points, i, config.eps);
        if seeds.len() < config.min_pts {
            labels[i] = Label::Noise;
            continue;
        }

        let id = next_cluster;
        next_cluster += 1;
        labels[i] = Label::Cluster(id);

        let mut queue = seeds;
        while let Some(j) = queue.pop() {
            match labels[j] {
                Label::Noise => labels[j] = Label::Cluster(id),
                Label::Unvisited => {
                    labels[j] = Label::Cluster(id);
                    let more = neighbours(points, j, config.eps);
                    if more.len() >= config.min_pts {
                        queue.extend(more);
                    }
                }
                Label::Cluster(_) => {}
            }
        }
    }

    let mut out = Clustering {
        clusters: vec![Vec::new(); next_cluster],
        noise: Vec::new(),
    };
    for (p, label) in points.iter().zip(labels) {
        match label {
            Label::Cluster(id) => out.clusters[id].push(*p),
            _ => out.noise.push(*p),
        }
    }
    out
}

/// Integer mean of a non-empty point set.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as i64;
    let (sx, sy) = points.iter().fold((0i64, 0i64), |(sx, sy), p| {
        (sx + i64::from(p.x), sy + i64::from(p.y))
    });
    Some(Point::new((sx / n) as i32, (sy / n) as i32))
}

/// Resolve candidates to one point: enough candidates, a cluster exists,
/// and noise does not exceed half the largest cluster.
pub fn resolve_candidates(
    points: &[Point],
    min_candidates: usize,
    config: &ClusterConfig,
) -> Option<Point> {
    if points.len() < min_candidates {
        return None;
    }
    let clustering = dbscan(points, config);
    let best = clustering.largest()?;
    if clustering.noise.len() * 2 > best.len() {
        return None;
    }
    centroid(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ClusterConfig {
        ClusterConfig::default()
    }

    fn tight_group(cx: i32, cy: i32, n: i32) -> Vec<Point> {
        (0..n).map(|i| Point::new(cx + i % 4, cy + i / 4)).collect()
    }

    #[test]
    fn tight_group_forms_one_cluster() {
        let pts = tight_group(100, 100, 10);
        let c = dbscan(&pts, &cfg());
        assert_eq!(c.clusters.len(), 1);
        assert_eq!(c.clusters[0].len(), 10);
        assert!(c.noise.is_empty());
    }

    #[test]
    fn scattered_points_are_noise() {
        let pts: Vec<Point> = (0..6).map(|i| Point::new(i * 1000, i * 1000)).collect();
        let c = dbscan(&pts, &cfg());
        assert!(c.clusters.is_empty());
        assert_eq!(c.noise.len(), 6);
    }

    #[test]
    fn core_point_needs_min_pts_others() {
        // Three points: each has only two others, below min_pts = 3.
        let pts = vec![Point::new(0, 0), Point::new(1, 0), Point::new(2, 0)];
        assert!(dbscan(&pts, &cfg()).clusters.is_empty());

        let pts = vec![
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(2, 0),
            Point::new(3, 0),
        ];
        assert_eq!(dbscan(&pts, &cfg()).clusters.len(), 1);
    }

    #[test]
    fn border_point_joins_cluster() {
        let mut pts = tight_group(0, 0, 4);
        // Reachable from the group but not itself core.
        pts.push(Point::new(130, 0));
        let c = dbscan(&pts, &cfg());
        assert_eq!(c.clusters.len(), 1);
        assert_eq!(c.clusters[0].len(), 5);
    }

    #[test]
    fn resolve_picks_largest_cluster_mean() {
        let mut pts = tight_group(100, 100, 8);
        pts.extend(tight_group(1000, 1000, 4));
        let p = resolve_candidates(&pts, 5, &cfg()).unwrap();
        let expected = centroid(&tight_group(100, 100, 8)).unwrap();
        assert_eq!(p, expected);
    }

    #[test]
    fn resolve_rejects_noisy_sets() {
        let mut pts = tight_group(100, 100, 4);
        pts.extend((0..3).map(|i| Point::new(5000 + i * 500, 0)));
        // 4 clustered, 3 noise: 3 * 2 > 4
        assert!(resolve_candidates(&pts, 5, &cfg()).is_none());
    }

    #[test]
    fn resolve_needs_min_candidates() {
        let pts = tight_group(10, 10, 4);
        assert!(resolve_candidates(&pts, 5, &cfg()).is_none());
    }

    #[test]
    fn centroid_is_integer_mean() {
        let pts = vec![Point::new(0, 0), Point::new(3, 1)];
        assert_eq!(centroid(&pts), Some(Point::new(1, 0)));
        assert_eq!(centroid(&[]), None);
    }
}
