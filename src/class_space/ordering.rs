use crate::class_space::fragment::Fragment;
use crate::domain::model::{OrderingEntry, WebDescriptor};
use crate::utils::error::{ExtenderError, Result};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use tracing::{debug, warn};

/// 主描述檔的排序指示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingDirective {
    /// 未宣告 absolute ordering, 依片段自己的 before/after
    Relative,
    /// 宣告了空的 absolute ordering, 不解析也不納入任何片段描述檔
    Disabled,
    Absolute(Vec<OrderingEntry>),
}

impl OrderingDirective {
    pub fn from_descriptor(descriptor: &WebDescriptor) -> Self {
        match &descriptor.absolute_ordering {
            None => OrderingDirective::Relative,
            Some(entries) if entries.is_empty() => OrderingDirective::Disabled,
            Some(entries) => OrderingDirective::Absolute(entries.clone()),
        }
    }

    pub fn parse_required(&self) -> bool {
        !matches!(self, OrderingDirective::Disabled)
    }
}

#[derive(Debug, Clone)]
pub struct OrderedFragments {
    /// 最終順序; container 片段在最後
    pub fragments: Vec<Fragment>,
    /// 對外公開的有序來源名稱, 只有在有排序時才存在
    pub ordered_libs: Option<Vec<String>>,
}

impl OrderedFragments {
    pub fn names(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.name.as_str()).collect()
    }
}

/// 依指示產生唯一的片段總順序
pub fn order_fragments(
    directive: &OrderingDirective,
    fragments: Vec<Fragment>,
) -> Result<OrderedFragments> {
    let (containers, candidates): (Vec<Fragment>, Vec<Fragment>) =
        fragments.into_iter().partition(Fragment::is_container);

    let (ordered, ordering_present) = match directive {
        OrderingDirective::Disabled => {
            for f in &candidates {
                debug!("Fragment {} excluded by empty absolute ordering", f.name);
            }
            (Vec::new(), true)
        }
        OrderingDirective::Absolute(entries) => (absolute_order(entries, candidates), true),
        OrderingDirective::Relative => {
            if candidates.iter().all(|f| f.ordering().is_empty()) {
                (candidates, false)
            } else {
                (relative_order(candidates)?, true)
            }
        }
    };

    let ordered_libs = ordering_present.then(|| {
        ordered
            .iter()
            .map(|f| f.source_name.clone())
            .collect::<Vec<_>>()
    });

    let mut fragments = ordered;
    fragments.extend(containers);

    Ok(OrderedFragments {
        fragments,
        ordered_libs,
    })
}

fn absolute_order(entries: &[OrderingEntry], candidates: Vec<Fragment>) -> Vec<Fragment> {
    let named: HashSet<&str> = entries
        .iter()
        .filter_map(|e| match e {
            OrderingEntry::Named(name) => Some(name.as_str()),
            OrderingEntry::Others => None,
        })
        .collect();

    let mut taken = vec![false; candidates.len()];
    let mut order = Vec::with_capacity(candidates.len());

    for entry in entries {
        match entry {
            OrderingEntry::Named(name) => {
                match candidates.iter().position(|f| &f.name == name) {
                    Some(i) if !taken[i] => {
                        taken[i] = true;
                        order.push(i);
                    }
                    Some(_) => {}
                    None => warn!("Fragment {} listed in absolute ordering was not found", name),
                }
            }
            OrderingEntry::Others => {
                for (i, f) in candidates.iter().enumerate() {
                    if !taken[i] && !named.contains(f.name.as_str()) {
                        taken[i] = true;
                        order.push(i);
                    }
                }
            }
        }
    }

    for (i, f) in candidates.iter().enumerate() {
        if !taken[i] {
            debug!("Fragment {} excluded by absolute ordering", f.name);
        }
    }

    let mut slots: Vec<Option<Fragment>> = candidates.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

// before-others / 一般 / after-others
const BEFORE_OTHERS: u8 = 0;
const NORMAL: u8 = 1;
const AFTER_OTHERS: u8 = 2;

fn relative_order(candidates: Vec<Fragment>) -> Result<Vec<Fragment>> {
    let n = candidates.len();
    let index: HashMap<&str, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.as_str(), i))
        .collect();

    let mut rank = vec![NORMAL; n];
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut indegree = vec![0usize; n];

    for (i, f) in candidates.iter().enumerate() {
        let ordering = f.ordering();
        let before_others = ordering.before.contains(&OrderingEntry::Others);
        let after_others = ordering.after.contains(&OrderingEntry::Others);
        if before_others && after_others {
            return Err(ExtenderError::conflict(format!(
                "Fragment {} is ordered both before and after others",
                f.name
            )));
        }
        if before_others {
            rank[i] = BEFORE_OTHERS;
        } else if after_others {
            rank[i] = AFTER_OTHERS;
        }

        for entry in &ordering.before {
            if let OrderingEntry::Named(name) = entry {
                match index.get(name.as_str()) {
                    Some(&j) => add_edge(&mut edges, &mut indegree, i, j),
                    None => debug!("Fragment {} is ordered before unknown fragment {}", f.name, name),
                }
            }
        }
        for entry in &ordering.after {
            if let OrderingEntry::Named(name) = entry {
                match index.get(name.as_str()) {
                    Some(&j) => add_edge(&mut edges, &mut indegree, j, i),
                    None => debug!("Fragment {} is ordered after unknown fragment {}", f.name, name),
                }
            }
        }
    }

    // Kahn: 就緒節點依 (rank, 發現順序) 取出
    let mut ready: BinaryHeap<Reverse<(u8, usize)>> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(|i| Reverse((rank[i], i)))
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(i);
        for &j in &edges[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse((rank[j], j)));
            }
        }
    }

    if order.len() != n {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let cyclic: Vec<&str> = (0..n)
            .filter(|i| !placed.contains(i))
            .map(|i| candidates[i].name.as_str())
            .collect();
        return Err(ExtenderError::conflict(format!(
            "Circular relative ordering between fragments: {}",
            cyclic.join(", ")
        )));
    }

    let mut slots: Vec<Option<Fragment>> = candidates.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

fn add_edge(edges: &mut [BTreeSet<usize>], indegree: &mut [usize], from: usize, to: usize) {
    if from != to && edges[from].insert(to) {
        indegree[to] += 1;
    }
}
