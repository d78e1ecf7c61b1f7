//! Rectangular minimum-cost assignment for invoice line matching.
//!
//! The Hungarian algorithm (potentials formulation) runs on a square
//! matrix; rectangular inputs are padded with a constant cost larger than
//! any real entry, which preserves optimality while letting surplus
//! rows/columns go unmatched.

/// Solve the minimum-cost assignment for an `n x m` cost matrix.
///
/// Returns, for each row, the assigned real column (`None` when the row
/// was absorbed by padding, i.e. left unmatched). All entries must be
/// finite and non-negative. When `n <= m` every row is matched; when
/// `n > m` exactly `n - m` rows stay unmatched.
pub fn solve(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    let m = cost[0].len();
    if m == 0 {
        return vec![None; n];
    }

    let k = n.max(m);
    let pad = cost
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(0.0_f64, f64::max)
        + 1.0;

    // Square matrix, 1-indexed for the potential loops below.
    let mut a = vec![vec![pad; k + 1]; k + 1];
    for (i, row) in cost.iter().enumerate() {
        for (j, &c) in row.iter().enumerate() {
            a[i + 1][j + 1] = c;
        }
    }

    let mut u = vec![0.0_f64; k + 1];
    let mut v = vec![0.0_f64; k + 1];
    // p[j] = row currently assigned to column j (0 = unassigned).
    let mut p = vec![0_usize; k + 1];
    let mut way = vec![0_usize; k + 1];

    for i in 1..=k {
        p[0] = i;
        let mut j0 = 0_usize;
        let mut minv = vec![f64::INFINITY; k + 1];
        let mut used = vec![false; k + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;

            for j in 1..=k {
                if used[j] {
                    continue;
                }
                let cur = a[i0][j] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=k {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment along the alternating path.
        while j0 != 0 {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
        }
    }

    let mut assignment = vec![None; n];
    for j in 1..=k {
        let i = p[j];
        if i >= 1 && i <= n && j <= m {
            assignment[i - 1] = Some(j - 1);
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_cost(cost: &[Vec<f64>], assignment: &[Option<usize>]) -> f64 {
        assignment
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| cost[i][j]))
            .sum()
    }

    #[test]
    fn test_identity_is_optimal() {
        let cost = vec![
            vec![0.0, 1.0, 1.0],
            vec![1.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        let assignment = solve(&cost);
        assert_eq!(assignment, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(total_cost(&cost, &assignment), 0.0);
    }

    #[test]
    fn test_picks_cheaper_permutation() {
        let cost = vec![vec![4.0, 1.0], vec![1.0, 4.0]];
        let assignment = solve(&cost);
        assert_eq!(assignment, vec![Some(1), Some(0)]);
        assert_eq!(total_cost(&cost, &assignment), 2.0);
    }

    #[test]
    fn test_wide_matrix_matches_all_rows() {
        // 2 rows, 4 columns: every row gets a column.
        let cost = vec![
            vec![5.0, 0.5, 9.0, 4.0],
            vec![0.5, 5.0, 9.0, 4.0],
        ];
        let assignment = solve(&cost);
        assert_eq!(assignment[0], Some(1));
        assert_eq!(assignment[1], Some(0));
    }

    #[test]
    fn test_tall_matrix_leaves_rows_unmatched() {
        // 3 rows, 1 column: exactly one row can match.
        let cost = vec![vec![2.0], vec![0.1], vec![1.0]];
        let assignment = solve(&cost);
        let matched: Vec<usize> = assignment.iter().flatten().copied().collect();
        assert_eq!(matched, vec![0]);
        assert_eq!(assignment[1], Some(0), "cheapest row should win the column");
    }

    #[test]
    fn test_single_cell() {
        assert_eq!(solve(&[vec![3.5]]), vec![Some(0)]);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(solve(&[]), Vec::<Option<usize>>::new());
        let no_cols: Vec<Vec<f64>> = vec![vec![], vec![]];
        assert_eq!(solve(&no_cols), vec![None, None]);
    }

    #[test]
    fn test_known_optimum_3x3() {
        let cost = vec![
            vec![2.0, 3.0, 3.0],
            vec![3.0, 2.0, 3.0],
            vec![3.0, 3.0, 2.0],
        ];
        let assignment = solve(&cost);
        assert_eq!(total_cost(&cost, &assignment), 6.0);
    }
}
