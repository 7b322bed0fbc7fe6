//! 邻域相关操作.
//!
//! 越界的坐标由 `wrapping_sub` / `saturating_add` 产生, 调用方需要自行过滤.

use crate::{Idx2d, Idx3d};
use itertools::iproduct;
use once_cell::sync::Lazy;

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
pub fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}

/// 获得 `(z, h, w)` 的 6-邻居 (钻石型) 索引, 以及每个邻居所在的轴
/// (0: z, 1: 高, 2: 宽). 不检查越界.
#[inline]
pub fn neighbour6((z, h, w): Idx3d) -> [(Idx3d, usize); 6] {
    [
        ((z.wrapping_sub(1), h, w), 0),
        ((z.saturating_add(1), h, w), 0),
        ((z, h.wrapping_sub(1), w), 1),
        ((z, h.saturating_add(1), w), 1),
        ((z, h, w.wrapping_sub(1)), 2),
        ((z, h, w.saturating_add(1)), 2),
    ]
}

/// 3x3x3 邻域中除中心以外的 26 个偏移量, 按 (z, 高, 宽) 行优先排列.
pub static OFFSETS_26: Lazy<Vec<(isize, isize, isize)>> = Lazy::new(|| {
    iproduct!(-1isize..=1, -1isize..=1, -1isize..=1)
        .filter(|&d| d != (0, 0, 0))
        .collect()
});

/// 将 `pos` 平移 `(dz, dh, dw)`. 若结果为负则返回 `None`. 不检查上界.
#[inline]
pub fn offset((z, h, w): Idx3d, (dz, dh, dw): (isize, isize, isize)) -> Option<Idx3d> {
    Some((
        z.checked_add_signed(dz)?,
        h.checked_add_signed(dh)?,
        w.checked_add_signed(dw)?,
    ))
}

/// 3x3x3 块内的局部坐标 (各分量取值 0..3) 压缩为 0..27 的下标.
#[inline]
pub(crate) const fn block_index((dz, dh, dw): (isize, isize, isize)) -> usize {
    ((dz + 1) * 9 + (dh + 1) * 3 + (dw + 1)) as usize
}

/// 判断 3x3x3 块内由 `mask` 标记的所有体素 (不含中心) 是否 6-连通.
///
/// 连通路径只能经过块内被标记的体素, 不能经过中心. 空集和单点视为连通.
pub(crate) fn is_block_connected(mask: &[bool; 27]) -> bool {
    const CENTER: usize = 13;
    debug_assert!(!mask[CENTER]);

    let total = mask.iter().filter(|m| **m).count();
    let Some(start) = mask.iter().position(|m| *m) else {
        return true;
    };
    if total == 1 {
        return true;
    }

    let mut visited = [false; 27];
    let mut stack = Vec::with_capacity(27);
    visited[start] = true;
    stack.push(start);
    let mut reached = 1usize;
    while let Some(cur) = stack.pop() {
        let (cz, ch, cw) = ((cur / 9) as isize, ((cur / 3) % 3) as isize, (cur % 3) as isize);
        for (dz, dh, dw) in [(-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0), (0, 0, -1), (0, 0, 1)] {
            let (nz, nh, nw) = (cz + dz, ch + dh, cw + dw);
            if !(0..3).contains(&nz) || !(0..3).contains(&nh) || !(0..3).contains(&nw) {
                continue;
            }
            let next = (nz * 9 + nh * 3 + nw) as usize;
            if mask[next] && !visited[next] {
                visited[next] = true;
                reached += 1;
                stack.push(next);
            }
        }
    }
    reached == total
}
