//! 二标签最小割原语, 以及一个基于 Dinic 最大流的默认实现.

use std::collections::VecDeque;

use ndarray::ArrayView2;

use crate::error::{SegError, SegResult};

/// 带权无向邻接边. 实际相邻项代价为 `weight * pairwise[la][lb]`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Edge {
    /// 端点 a.
    pub a: usize,
    /// 端点 b.
    pub b: usize,
    /// 边权重.
    pub weight: i32,
}

/// 在图上最小化二标签能量的黑盒原语.
pub trait MinCut {
    /// 输入邻接边, `[V, 2]` 的一元代价和 `2 × 2` 的相邻代价矩阵,
    /// 返回每个顶点的标签 (0 或 1).
    fn cut_from_graph(
        &mut self,
        edges: &[Edge],
        unary: ArrayView2<i32>,
        pairwise: [[i32; 2]; 2],
    ) -> SegResult<Vec<u8>>;
}

/// 残量网络中的一条弧. 弧 `e` 与 `e ^ 1` 互为反向弧.
#[derive(Copy, Clone, Debug)]
struct Arc {
    to: usize,
    cap: i64,
}

/// Dinic 最大流. 割后与源点相连的顶点取标签 0, 其余取标签 1.
#[derive(Debug, Default)]
pub struct Dinic {
    arcs: Vec<Arc>,
    adj: Vec<Vec<usize>>,
    level: Vec<i32>,
    iter: Vec<usize>,
}

impl Dinic {
    fn reset(&mut self, n: usize) {
        self.arcs.clear();
        self.adj.clear();
        self.adj.resize_with(n, Vec::new);
        self.level = vec![-1; n];
        self.iter = vec![0; n];
    }

    fn add_arc(&mut self, u: usize, v: usize, cap: i64, rev_cap: i64) {
        if cap == 0 && rev_cap == 0 {
            return;
        }
        self.adj[u].push(self.arcs.len());
        self.arcs.push(Arc { to: v, cap });
        self.adj[v].push(self.arcs.len());
        self.arcs.push(Arc { to: u, cap: rev_cap });
    }

    fn bfs(&mut self, s: usize, t: usize) -> bool {
        self.level.iter_mut().for_each(|l| *l = -1);
        let mut q = VecDeque::with_capacity(self.adj.len());
        self.level[s] = 0;
        q.push_back(s);
        while let Some(u) = q.pop_front() {
            for &e in self.adj[u].iter() {
                let Arc { to, cap } = self.arcs[e];
                if cap > 0 && self.level[to] < 0 {
                    self.level[to] = self.level[u] + 1;
                    q.push_back(to);
                }
            }
        }
        self.level[t] >= 0
    }

    /// 在分层图上找一条增广路并推流, 返回推送量. 非递归实现.
    fn augment(&mut self, s: usize, t: usize) -> i64 {
        let mut path: Vec<usize> = Vec::new();
        let mut u = s;
        loop {
            if u == t {
                let f = path.iter().map(|&e| self.arcs[e].cap).min().unwrap_or(0);
                for &e in path.iter() {
                    self.arcs[e].cap -= f;
                    self.arcs[e ^ 1].cap += f;
                }
                return f;
            }
            let mut advanced = false;
            while self.iter[u] < self.adj[u].len() {
                let e = self.adj[u][self.iter[u]];
                let Arc { to, cap } = self.arcs[e];
                if cap > 0 && self.level[to] == self.level[u] + 1 {
                    path.push(e);
                    u = to;
                    advanced = true;
                    break;
                }
                self.iter[u] += 1;
            }
            if !advanced {
                // 死胡同, 回退一步.
                self.level[u] = -1;
                let Some(e) = path.pop() else {
                    return 0;
                };
                u = self.arcs[e ^ 1].to;
                self.iter[u] += 1;
            }
        }
    }

    /// 计算最大流, 返回流量.
    fn max_flow(&mut self, s: usize, t: usize) -> i64 {
        let mut flow = 0;
        while self.bfs(s, t) {
            self.iter.iter_mut().for_each(|i| *i = 0);
            loop {
                let f = self.augment(s, t);
                if f == 0 {
                    break;
                }
                flow += f;
            }
        }
        flow
    }

    /// 残量网络中从源点可达的顶点.
    fn source_side(&self, s: usize) -> Vec<bool> {
        let mut seen = vec![false; self.adj.len()];
        let mut q = VecDeque::from([s]);
        seen[s] = true;
        while let Some(u) = q.pop_front() {
            for &e in self.adj[u].iter() {
                let Arc { to, cap } = self.arcs[e];
                if cap > 0 && !seen[to] {
                    seen[to] = true;
                    q.push_back(to);
                }
            }
        }
        seen
    }
}

impl MinCut for Dinic {
    fn cut_from_graph(
        &mut self,
        edges: &[Edge],
        unary: ArrayView2<i32>,
        pairwise: [[i32; 2]; 2],
    ) -> SegResult<Vec<u8>> {
        let (n, classes) = unary.dim();
        if classes != 2 {
            return Err(SegError::Config(format!(
                "min cut expects 2 labels, got {classes}"
            )));
        }
        let [[a, b], [c, d]] = pairwise.map(|r| r.map(i64::from));
        if b + c < a + d {
            return Err(SegError::Config("pairwise term is not submodular".into()));
        }
        let (s, t) = (n, n + 1);
        self.reset(n + 2);

        // 标签 1 的额外代价 (可正可负), 最后统一转为源/汇弧.
        let mut extra: Vec<i64> = unary
            .rows()
            .into_iter()
            .map(|r| i64::from(r[1]) - i64::from(r[0]))
            .collect();

        // E(xa, xb) = A + (C - A) xa + (D - C) xb + (B + C - A - D) (1 - xa) xb
        for e in edges.iter() {
            if e.a >= n || e.b >= n {
                return Err(SegError::Config(format!("edge {e:?} out of range")));
            }
            let w = i64::from(e.weight.max(0));
            extra[e.a] += w * (c - a);
            extra[e.b] += w * (d - c);
            self.add_arc(e.a, e.b, w * (b + c - a - d), 0);
        }
        for (v, &x) in extra.iter().enumerate() {
            if x > 0 {
                self.add_arc(s, v, x, 0);
            } else if x < 0 {
                self.add_arc(v, t, -x, 0);
            }
        }

        let flow = self.max_flow(s, t);
        log::debug!("min cut over {n} vertices, {} edges, flow {flow}", edges.len());
        let side = self.source_side(s);
        Ok(side[..n].iter().map(|&src| u8::from(!src)).collect())
    }
}
