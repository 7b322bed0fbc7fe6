//! 三维连通域标记.

use std::collections::VecDeque;

use crate::consts::{is_foreground, BACKGROUND};
use crate::{Label, LabelVolume};

/// 将 `volume` 中所有非背景体素按 6-邻接划分为连通域, 重新编号为 `1, 2, ...`.
///
/// 编号顺序即每个连通域在规范顺序 (z, 高, 宽) 下第一次出现的先后顺序,
/// 因此结果是确定的. 背景保持为 `0`, 原始标签值本身被丢弃
/// (两个相邻但标签不同的前景区域会被合并).
///
/// 用于真值只是二值掩码的情形.
pub fn extract_ground_truth_labels(volume: &LabelVolume) -> LabelVolume {
    let mut out = vec![BACKGROUND; volume.size()];
    let mut next: Label = 1;
    let mut queue = VecDeque::with_capacity(64);

    for (pos, &label) in volume.indexed_iter() {
        let index = volume.linear_index(pos);
        if !is_foreground(label) || out[index] != BACKGROUND {
            continue;
        }

        out[index] = next;
        queue.push_back(pos);
        while let Some(cur) = queue.pop_front() {
            for (neigh, _) in volume.diamond_neighbours(cur) {
                let ni = volume.linear_index(neigh);
                if is_foreground(volume[neigh]) && out[ni] == BACKGROUND {
                    out[ni] = next;
                    queue.push_back(neigh);
                }
            }
        }
        next += 1;
    }

    log::debug!("extracted {} ground truth components", next - 1);
    volume.with_same_geometry(out)
}
