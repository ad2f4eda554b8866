//! Incremental Delaunay triangulation (a Rust port of the delaunator
//! algorithm), used internally by the TIN interpolator to build a ground
//! surface from scattered points. Kept private: callers only see
//! [`crate::interpolate::interpolate_tin`].

pub const EMPTY: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DPoint {
    pub x: f64,
    pub y: f64,
}

impl DPoint {
    fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    fn orient(&self, q: &Self, r: &Self) -> bool {
        (q.y - self.y) * (r.x - q.x) - (q.x - self.x) * (r.y - q.y) < 0.0
    }

    fn circumdelta(&self, b: &Self, c: &Self) -> (f64, f64) {
        let dx = b.x - self.x;
        let dy = b.y - self.y;
        let ex = c.x - self.x;
        let ey = c.y - self.y;
        let bl = dx * dx + dy * dy;
        let cl = ex * ex + ey * ey;
        let d = 0.5 / (dx * ey - dy * ex);
        ((ey * bl - dy * cl) * d, (dx * cl - ex * bl) * d)
    }

    fn circumradius2(&self, b: &Self, c: &Self) -> f64 {
        let (x, y) = self.circumdelta(b, c);
        x * x + y * y
    }

    fn circumcenter(&self, b: &Self, c: &Self) -> Self {
        let (x, y) = self.circumdelta(b, c);
        DPoint {
            x: self.x + x,
            y: self.y + y,
        }
    }

    fn in_circle(&self, b: &Self, c: &Self, p: &Self) -> bool {
        let dx = self.x - p.x;
        let dy = self.y - p.y;
        let ex = b.x - p.x;
        let ey = b.y - p.y;
        let fx = c.x - p.x;
        let fy = c.y - p.y;
        let ap = dx * dx + dy * dy;
        let bp = ex * ex + ey * ey;
        let cp = fx * fx + fy * fy;
        dx * (ey * cp - bp * fy) - dy * (ex * cp - bp * fx) + ap * (ex * fy - ey * fx) < 0.0
    }

    fn nearly_equals(&self, other: &Self) -> bool {
        (self.x - other.x).hypot(self.y - other.y) <= 1e-10
    }
}

pub struct Triangulation {
    pub triangles: Vec<usize>,
    pub halfedges: Vec<usize>,
    pub hull: Vec<usize>,
}

impl Triangulation {
    fn new(n: usize) -> Self {
        let max_triangles = if n >= 3 { 2 * n - 5 } else { 0 };
        Triangulation {
            triangles: Vec::with_capacity(max_triangles * 3),
            halfedges: Vec::with_capacity(max_triangles * 3),
            hull: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    fn next_halfedge(&self, edge: usize) -> usize {
        if edge % 3 == 2 {
            edge - 2
        } else {
            edge + 1
        }
    }

    fn prev_halfedge(&self, edge: usize) -> usize {
        if edge % 3 == 0 {
            edge + 2
        } else {
            edge - 1
        }
    }

    pub fn points_of_triangle(&self, triangle: usize) -> [usize; 3] {
        [
            self.triangles[3 * triangle],
            self.triangles[3 * triangle + 1],
            self.triangles[3 * triangle + 2],
        ]
    }

    fn add_triangle(&mut self, i0: usize, i1: usize, i2: usize, a: usize, b: usize, c: usize) -> usize {
        let t = self.triangles.len();
        self.triangles.push(i0);
        self.triangles.push(i1);
        self.triangles.push(i2);
        self.halfedges.push(a);
        self.halfedges.push(b);
        self.halfedges.push(c);
        if a != EMPTY {
            self.halfedges[a] = t;
        }
        if b != EMPTY {
            self.halfedges[b] = t + 1;
        }
        if c != EMPTY {
            self.halfedges[c] = t + 2;
        }
        t
    }

    fn legalize(&mut self, a: usize, points: &[DPoint], hull: &mut Hull) -> usize {
        let b = self.halfedges[a];
        let ar = self.prev_halfedge(a);
        if b == EMPTY {
            return ar;
        }
        let al = self.next_halfedge(a);
        let bl = self.prev_halfedge(b);
        let p0 = self.triangles[ar];
        let pr = self.triangles[a];
        let pl = self.triangles[al];
        let p1 = self.triangles[bl];

        let illegal = points[p0].in_circle(&points[pr], &points[pl], &points[p1]);
        if illegal {
            self.triangles[a] = p1;
            self.triangles[b] = p0;

            let hbl = self.halfedges[bl];
            let har = self.halfedges[ar];

            if hbl == EMPTY {
                let mut e = hull.start;
                loop {
                    if hull.tri[e] == bl {
                        hull.tri[e] = a;
                        break;
                    }
                    e = hull.next[e];
                    if e == hull.start || e == EMPTY {
                        break;
                    }
                }
            }

            self.halfedges[a] = hbl;
            self.halfedges[b] = har;
            self.halfedges[ar] = bl;

            if hbl != EMPTY {
                self.halfedges[hbl] = a;
            }
            if har != EMPTY {
                self.halfedges[har] = b;
            }
            if bl != EMPTY {
                self.halfedges[bl] = ar;
            }

            let br = self.next_halfedge(b);
            self.legalize(a, points, hull);
            return self.legalize(br, points, hull);
        }
        ar
    }
}

struct Hull {
    prev: Vec<usize>,
    next: Vec<usize>,
    tri: Vec<usize>,
    hash: Vec<usize>,
    start: usize,
    center: DPoint,
}

impl Hull {
    fn new(n: usize, center: DPoint, i0: usize, i1: usize, i2: usize, points: &[DPoint]) -> Self {
        let hash_len = (n as f64).sqrt().max(1.0) as usize;
        let mut hull = Hull {
            prev: vec![0; n],
            next: vec![0; n],
            tri: vec![0; n],
            hash: vec![EMPTY; hash_len],
            start: i0,
            center,
        };
        hull.next[i0] = i1;
        hull.prev[i2] = i1;
        hull.next[i1] = i2;
        hull.prev[i0] = i2;
        hull.next[i2] = i0;
        hull.prev[i1] = i0;

        hull.tri[i0] = 0;
        hull.tri[i1] = 1;
        hull.tri[i2] = 2;

        hull.hash_edge(&points[i0], i0);
        hull.hash_edge(&points[i1], i1);
        hull.hash_edge(&points[i2], i2);
        hull
    }

    fn hash_key(&self, p: &DPoint) -> usize {
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        let p = dx / (dx.abs() + dy.abs());
        let a = (if dy > 0.0 { 3.0 - p } else { 1.0 + p }) / 4.0;
        let len = self.hash.len();
        (((len as f64) * a).floor() as usize) % len
    }

    fn hash_edge(&mut self, p: &DPoint, i: usize) {
        let key = self.hash_key(p);
        self.hash[key] = i;
    }

    fn find_visible_edge(&self, p: &DPoint, points: &[DPoint]) -> (usize, bool) {
        let mut start: usize = 0;
        let key = self.hash_key(p);
        let len = self.hash.len();
        for j in 0..len {
            start = self.hash[(key + j) % len];
            if start != EMPTY && self.next[start] != EMPTY {
                break;
            }
        }
        start = self.prev[start];
        let mut e = start;
        while !p.orient(&points[e], &points[self.next[e]]) {
            e = self.next[e];
            if e == start {
                return (EMPTY, false);
            }
        }
        (e, e == start)
    }
}

fn calc_bbox_center(points: &[DPoint]) -> DPoint {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    DPoint {
        x: (min_x + max_x) / 2.0,
        y: (min_y + max_y) / 2.0,
    }
}

fn find_closest_point(points: &[DPoint], p0: &DPoint) -> Option<usize> {
    let mut min_dist = f64::INFINITY;
    let mut k = 0usize;
    for (i, p) in points.iter().enumerate() {
        let d = p0.distance_squared(p);
        if d > 0.0 && d < min_dist {
            k = i;
            min_dist = d;
        }
    }
    (min_dist != f64::INFINITY).then_some(k)
}

fn find_seed_triangle(points: &[DPoint]) -> Option<(usize, usize, usize)> {
    let bbox_center = calc_bbox_center(points);
    let i0 = find_closest_point(points, &bbox_center)?;
    let p0 = &points[i0];

    let i1 = find_closest_point(points, p0)?;
    let p1 = &points[i1];

    let mut min_radius = f64::INFINITY;
    let mut i2 = 0usize;
    for (i, p) in points.iter().enumerate() {
        if i == i0 || i == i1 {
            continue;
        }
        let r = p0.circumradius2(p1, p);
        if r < min_radius {
            i2 = i;
            min_radius = r;
        }
    }

    if min_radius == f64::INFINITY {
        None
    } else if p0.orient(p1, &points[i2]) {
        Some((i0, i2, i1))
    } else {
        Some((i0, i1, i2))
    }
}

/// Triangulates a point set, returning `None` when no triangulation exists
/// (fewer than 3 points, or all points collinear/coincident).
pub fn triangulate(points: &[DPoint]) -> Option<Triangulation> {
    let n = points.len();
    if n < 3 {
        return None;
    }

    let (i0, i1, i2) = find_seed_triangle(points)?;
    let center = points[i0].circumcenter(&points[i1], &points[i2]);

    let mut triangulation = Triangulation::new(n);
    triangulation.add_triangle(i0, i1, i2, EMPTY, EMPTY, EMPTY);

    let mut dists: Vec<_> = points
        .iter()
        .enumerate()
        .map(|(i, point)| (i, center.distance_squared(point)))
        .collect();
    dists.sort_unstable_by(|&(_, da), &(_, db)| da.partial_cmp(&db).unwrap());

    let mut hull = Hull::new(n, center, i0, i1, i2, points);

    for (k, &(i, _)) in dists.iter().enumerate() {
        let p = &points[i];
        if k > 0 && p.nearly_equals(&points[dists[k - 1].0]) {
            continue;
        }
        if i == i0 || i == i1 || i == i2 {
            continue;
        }

        let (mut e, walk_back) = hull.find_visible_edge(p, points);
        if e == EMPTY {
            continue;
        }

        let t = triangulation.add_triangle(e, i, hull.next[e], EMPTY, EMPTY, hull.tri[e]);
        hull.tri[i] = triangulation.legalize(t + 2, points, &mut hull);
        hull.tri[e] = t;

        let mut n_edge = hull.next[e];
        loop {
            let q = hull.next[n_edge];
            if !p.orient(&points[n_edge], &points[q]) {
                break;
            }
            let t = triangulation.add_triangle(n_edge, i, q, hull.tri[i], EMPTY, hull.tri[n_edge]);
            hull.tri[i] = triangulation.legalize(t + 2, points, &mut hull);
            hull.next[n_edge] = EMPTY;
            n_edge = q;
        }

        if walk_back {
            loop {
                let q = hull.prev[e];
                if !p.orient(&points[q], &points[e]) {
                    break;
                }
                let t = triangulation.add_triangle(q, i, e, EMPTY, hull.tri[e], hull.tri[q]);
                triangulation.legalize(t + 2, points, &mut hull);
                hull.tri[q] = t;
                hull.next[e] = EMPTY;
                e = q;
            }
        }

        hull.prev[i] = e;
        hull.next[i] = n_edge;
        hull.prev[n_edge] = i;
        hull.next[e] = i;
        hull.start = e;

        hull.hash_edge(p, i);
        hull.hash_edge(&points[e], e);
    }

    let mut e = hull.start;
    loop {
        triangulation.hull.push(e);
        e = hull.next[e];
        if e == hull.start {
            break;
        }
    }

    triangulation.triangles.shrink_to_fit();
    triangulation.halfedges.shrink_to_fit();
    Some(triangulation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangulates_a_square() {
        let pts = vec![
            DPoint { x: 0.0, y: 0.0 },
            DPoint { x: 1.0, y: 0.0 },
            DPoint { x: 1.0, y: 1.0 },
            DPoint { x: 0.0, y: 1.0 },
        ];
        let tri = triangulate(&pts).expect("square should triangulate");
        assert_eq!(tri.len(), 2);
    }

    #[test]
    fn collinear_points_have_no_triangulation() {
        let pts = vec![
            DPoint { x: 0.0, y: 0.0 },
            DPoint { x: 1.0, y: 0.0 },
            DPoint { x: 2.0, y: 0.0 },
        ];
        assert!(triangulate(&pts).is_none());
    }

    #[test]
    fn fewer_than_three_points_is_none() {
        let pts = vec![DPoint { x: 0.0, y: 0.0 }, DPoint { x: 1.0, y: 0.0 }];
        assert!(triangulate(&pts).is_none());
    }
}
