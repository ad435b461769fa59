/// Solve the assignment problem for a rows × cols cost matrix.
///
/// Returns one entry per row holding its assigned column. The matrix is
/// padded to a square with zero-cost cells internally, so when there are
/// more rows than columns the surplus rows come back as `None`. Non-finite
/// costs are treated as prohibitively large.
pub fn min_cost_assignment(costs: &[Vec<f64>]) -> Vec<Option<usize>> {
    let rows = costs.len();
    if rows == 0 {
        return Vec::new();
    }
    let cols = costs.iter().map(Vec::len).max().unwrap_or(0);
    let n = rows.max(cols);
    if cols == 0 {
        return vec![None; rows];
    }

    let large = costs
        .iter()
        .flatten()
        .copied()
        .filter(|c| c.is_finite())
        .fold(0.0f64, |acc, c| acc.max(c.abs()))
        * (n as f64 + 1.0)
        + 1.0;
    let cell = |r: usize, c: usize| -> f64 {
        match costs.get(r).and_then(|row| row.get(c)) {
            Some(v) if v.is_finite() => *v,
            Some(_) => large,
            None => 0.0,
        }
    };

    // Column `n` is the virtual start column of each augmenting search.
    let mut row_potential = vec![0.0f64; n];
    let mut col_potential = vec![0.0f64; n + 1];
    let mut owner: Vec<Option<usize>> = vec![None; n + 1];
    let mut way = vec![n; n + 1];

    for row in 0..n {
        owner[n] = Some(row);
        let mut current = n;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut visited = vec![false; n + 1];

        loop {
            visited[current] = true;
            let Some(r) = owner[current] else { break };
            let mut delta = f64::INFINITY;
            let mut next = n;

            for col in 0..n {
                if visited[col] {
                    continue;
                }
                let slack = cell(r, col) - row_potential[r] - col_potential[col];
                if slack < min_slack[col] {
                    min_slack[col] = slack;
                    way[col] = current;
                }
                if min_slack[col] < delta {
                    delta = min_slack[col];
                    next = col;
                }
            }
            if next == n {
                break;
            }

            for col in 0..=n {
                if visited[col] {
                    if let Some(owner_row) = owner[col] {
                        row_potential[owner_row] += delta;
                    }
                    col_potential[col] -= delta;
                } else {
                    min_slack[col] -= delta;
                }
            }

            current = next;
            if owner[current].is_none() {
                break;
            }
        }

        // Flip the augmenting path back to the start column
        while current != n {
            let prev = way[current];
            owner[current] = owner[prev];
            current = prev;
        }
    }

    let mut assignment = vec![None; rows];
    for (col, slot) in owner.iter().take(cols).enumerate() {
        if let Some(row) = *slot {
            if row < rows {
                assignment[row] = Some(col);
            }
        }
    }
    assignment
}

/// Total cost of an assignment over the real cells
pub fn assignment_cost(costs: &[Vec<f64>], assignment: &[Option<usize>]) -> f64 {
    assignment
        .iter()
        .enumerate()
        .filter_map(|(row, col)| col.and_then(|c| costs.get(row)?.get(c).copied()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_min(costs: &[Vec<f64>]) -> f64 {
        fn permute(costs: &[Vec<f64>], row: usize, used: &mut Vec<bool>, acc: f64, best: &mut f64) {
            if row == costs.len() {
                *best = best.min(acc);
                return;
            }
            for col in 0..costs.len() {
                if !used[col] {
                    used[col] = true;
                    permute(costs, row + 1, used, acc + costs[row][col], best);
                    used[col] = false;
                }
            }
        }
        let mut best = f64::INFINITY;
        permute(costs, 0, &mut vec![false; costs.len()], 0.0, &mut best);
        best
    }

    #[test]
    fn test_identity_on_diagonal() {
        let costs = vec![
            vec![0.1, 0.9, 0.9],
            vec![0.9, 0.2, 0.9],
            vec![0.9, 0.9, 0.3],
        ];
        assert_eq!(
            min_cost_assignment(&costs),
            vec![Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn test_matches_brute_force() {
        let costs = vec![
            vec![4.0, 1.0, 3.0, 2.0],
            vec![2.0, 0.0, 5.0, 3.0],
            vec![3.0, 2.0, 2.0, 1.0],
            vec![4.0, 3.0, 1.0, 6.0],
        ];
        let assignment = min_cost_assignment(&costs);
        assert!(assignment.iter().all(Option::is_some));
        assert_eq!(assignment_cost(&costs, &assignment), brute_force_min(&costs));
    }

    #[test]
    fn test_greedy_trap() {
        // greedy would take (0,0) and pay 100 on row 1
        let costs = vec![vec![1.0, 2.0], vec![1.5, 100.0]];
        assert_eq!(min_cost_assignment(&costs), vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_more_rows_than_columns() {
        let costs = vec![vec![5.0], vec![1.0], vec![3.0]];
        assert_eq!(min_cost_assignment(&costs), vec![None, Some(0), None]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(min_cost_assignment(&[]).is_empty());
        assert_eq!(min_cost_assignment(&[vec![], vec![]]), vec![None, None]);
    }

    #[test]
    fn test_non_finite_cost_avoided() {
        let costs = vec![vec![f64::NAN, 1.0], vec![1.0, 1.0]];
        assert_eq!(min_cost_assignment(&costs), vec![Some(1), Some(0)]);
    }
}
