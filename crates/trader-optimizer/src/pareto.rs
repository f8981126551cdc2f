//! 파레토 프런티어 관리.
//!
//! 해 A가 해 B를 지배(dominate)한다는 것은 활성 목표 전부에서 A가 B보다
//! 나쁘지 않고, 적어도 하나에서 엄밀히 더 좋다는 뜻입니다. 점수가 없는 목표는
//! 가장 나쁜 값으로 취급합니다.
//!
//! 프런티어 재계산은 평가된 해 n개에 대해 O(n²)이며, n은 최대 반복 횟수로
//! 제한됩니다.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    objective::{Objective, ObjectiveScores},
    solution::OptimizationSolution,
};

/// `a`가 `b`를 지배하는지 여부.
pub fn dominates(a: &ObjectiveScores, b: &ObjectiveScores, objectives: &[Objective]) -> bool {
    let mut strictly_better = false;
    for objective in objectives {
        match objective.compare(a.get(*objective), b.get(*objective)) {
            Ordering::Less => return false,
            Ordering::Greater => strictly_better = true,
            Ordering::Equal => {}
        }
    }
    strictly_better
}

/// 활성 목표 기준으로 두 점수 벡터가 동일한지 여부.
fn equivalent(a: &ObjectiveScores, b: &ObjectiveScores, objectives: &[Objective]) -> bool {
    objectives
        .iter()
        .all(|o| o.compare(a.get(*o), b.get(*o)) == Ordering::Equal)
}

/// 비지배 해의 인덱스 (평가 순서 유지).
///
/// 동일한 점수 벡터가 여러 개면 가장 먼저 평가된 해만 남깁니다.
pub fn pareto_front(scores: &[&ObjectiveScores], objectives: &[Objective]) -> Vec<usize> {
    (0..scores.len())
        .filter(|&i| {
            let dominated = scores
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && dominates(other, scores[i], objectives));
            let shadowed = scores[..i]
                .iter()
                .any(|earlier| equivalent(earlier, scores[i], objectives));
            !dominated && !shadowed
        })
        .collect()
}

/// 비지배 정렬 (NSGA-II).
///
/// 첫 번째 프런트가 가장 좋은 계층입니다. 모든 인덱스는 정확히 한 프런트에
/// 속합니다 (동일 점수 벡터도 같은 프런트에 함께 들어감).
pub fn non_dominated_sort(scores: &[&ObjectiveScores], objectives: &[Objective]) -> Vec<Vec<usize>> {
    let n = scores.len();
    let mut dominated_by_count = vec![0usize; n];
    let mut dominates_list: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(scores[i], scores[j], objectives) {
                dominates_list[i].push(j);
                dominated_by_count[j] += 1;
            } else if dominates(scores[j], scores[i], objectives) {
                dominates_list[j].push(i);
                dominated_by_count[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| dominated_by_count[i] == 0).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominates_list[i] {
                dominated_by_count[j] -= 1;
                if dominated_by_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// 프런트 내부 혼잡도 거리.
///
/// 반환 벡터는 `front`와 같은 순서입니다. 각 목표의 경계 해는 무한대를 받으며,
/// 값이 클수록 목표 공간에서 덜 붐비는 영역에 있습니다.
pub fn crowding_distance(
    front: &[usize],
    scores: &[&ObjectiveScores],
    objectives: &[Objective],
) -> Vec<f64> {
    let len = front.len();
    let mut distance = vec![0.0; len];
    if len <= 2 {
        return vec![f64::INFINITY; len];
    }

    for objective in objectives {
        // 점수 없는 해는 가장 나쁜 값(비용 무한대)으로 취급
        let cost = |pos: usize| -> f64 {
            scores[front[pos]]
                .get(*objective)
                .map(|v| objective.to_cost(v))
                .unwrap_or(f64::INFINITY)
        };

        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| cost(a).partial_cmp(&cost(b)).unwrap_or(Ordering::Equal));

        let lo = cost(order[0]);
        let hi = cost(order[len - 1]);
        distance[order[0]] = f64::INFINITY;
        distance[order[len - 1]] = f64::INFINITY;

        let span = hi - lo;
        if !span.is_finite() || span <= 0.0 {
            continue;
        }
        for k in 1..len - 1 {
            let gap = cost(order[k + 1]) - cost(order[k - 1]);
            if gap.is_finite() {
                distance[order[k]] += gap / span;
            }
        }
    }

    distance
}

/// 평가된 해 전체에 대한 파레토 프런티어.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParetoFrontier {
    objectives: Vec<Objective>,
    members: Vec<usize>,
}

impl ParetoFrontier {
    /// 활성 목표로 빈 프런티어 생성.
    pub fn new(objectives: Vec<Objective>) -> Self {
        Self {
            objectives,
            members: Vec::new(),
        }
    }

    /// 활성 목표.
    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// 현재 프런티어 해의 인덱스.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// 학습 구간 점수로 프런티어를 다시 계산하고 모든 해의 파레토 플래그를 갱신.
    pub fn recompute(&mut self, solutions: &mut [OptimizationSolution]) -> &[usize] {
        let scores: Vec<&ObjectiveScores> = solutions.iter().map(|s| &s.in_sample_scores).collect();
        self.members = pareto_front(&scores, &self.objectives);

        for solution in solutions.iter_mut() {
            solution.is_pareto_optimal = false;
        }
        for &i in &self.members {
            solutions[i].is_pareto_optimal = true;
        }
        &self.members
    }

    /// 프런티어 해 사본.
    pub fn snapshot(&self, solutions: &[OptimizationSolution]) -> Vec<OptimizationSolution> {
        self.members
            .iter()
            .filter_map(|&i| solutions.get(i).cloned())
            .collect()
    }

    /// 주 목표 기준 최고의 프런티어 해.
    pub fn best<'a>(&self, solutions: &'a [OptimizationSolution]) -> Option<&'a OptimizationSolution> {
        let primary = *self.objectives.first()?;
        self.members
            .iter()
            .filter_map(|&i| solutions.get(i))
            .max_by(|a, b| {
                primary
                    .compare(a.score(primary), b.score(primary))
                    // 동률이면 먼저 평가된 해 우선
                    .then_with(|| b.evaluation_index.cmp(&a.evaluation_index))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ParameterSet;

    const OBJECTIVES: [Objective; 2] = [Objective::SharpeRatio, Objective::MaxDrawdown];

    fn scores(sharpe: f64, drawdown: f64) -> ObjectiveScores {
        ObjectiveScores::new()
            .with(Objective::SharpeRatio, sharpe)
            .with(Objective::MaxDrawdown, drawdown)
    }

    fn solutions(points: &[(f64, f64)]) -> Vec<OptimizationSolution> {
        points
            .iter()
            .enumerate()
            .map(|(i, (s, d))| OptimizationSolution::new(i, ParameterSet::new(), scores(*s, *d)))
            .collect()
    }

    #[test]
    fn test_trade_off_pair_both_on_frontier() {
        let a = scores(1.5, 15.0);
        let b = scores(1.2, 10.0);
        assert!(!dominates(&a, &b, &OBJECTIVES));
        assert!(!dominates(&b, &a, &OBJECTIVES));
        assert_eq!(pareto_front(&[&a, &b], &OBJECTIVES), vec![0, 1]);
    }

    #[test]
    fn test_better_in_both_dominates() {
        // sharpe 1.5 / dd 10 은 sharpe 1.2 / dd 15 보다 두 목표 모두 좋음
        let a = scores(1.5, 10.0);
        let b = scores(1.2, 15.0);
        assert!(dominates(&a, &b, &OBJECTIVES));
        assert_eq!(pareto_front(&[&a, &b], &OBJECTIVES), vec![0]);
    }

    #[test]
    fn test_dominated_solution_excluded() {
        let good = scores(1.2, 15.0);
        let bad = scores(1.0, 20.0);
        assert!(dominates(&good, &bad, &OBJECTIVES));
        assert_eq!(pareto_front(&[&bad, &good], &OBJECTIVES), vec![1]);
    }

    #[test]
    fn test_missing_score_is_worst() {
        let full = scores(1.0, 10.0);
        let partial = ObjectiveScores::new().with(Objective::SharpeRatio, 1.0);
        assert!(dominates(&full, &partial, &OBJECTIVES));
        assert!(!dominates(&partial, &full, &OBJECTIVES));
    }

    #[test]
    fn test_ties_keep_earliest() {
        let a = scores(1.0, 10.0);
        let b = scores(1.0, 10.0);
        assert_eq!(pareto_front(&[&a, &b], &OBJECTIVES), vec![0]);
    }

    #[test]
    fn test_recompute_updates_flags() {
        let mut sols = solutions(&[(1.0, 20.0), (1.2, 15.0), (1.5, 18.0)]);
        let mut frontier = ParetoFrontier::new(OBJECTIVES.to_vec());

        assert_eq!(frontier.recompute(&mut sols), &[1, 2]);
        assert!(!sols[0].is_pareto_optimal);
        assert!(sols[1].is_pareto_optimal && sols[2].is_pareto_optimal);

        // 모든 해를 지배하는 새 해 추가
        sols.push(OptimizationSolution::new(3, ParameterSet::new(), scores(2.0, 5.0)));
        frontier.recompute(&mut sols);
        assert_eq!(frontier.members(), &[3]);
        assert!(!sols[1].is_pareto_optimal);
        assert_eq!(frontier.best(&sols).unwrap().evaluation_index, 3);
    }

    #[test]
    fn test_non_dominated_sort_layers() {
        let pts = [scores(2.0, 5.0), scores(1.0, 20.0), scores(1.5, 10.0), scores(1.0, 4.0)];
        let refs: Vec<&ObjectiveScores> = pts.iter().collect();
        let fronts = non_dominated_sort(&refs, &OBJECTIVES);

        assert_eq!(fronts[0], vec![0, 3]);
        assert_eq!(fronts[1], vec![2]);
        assert_eq!(fronts[2], vec![1]);
        assert_eq!(fronts.iter().map(Vec::len).sum::<usize>(), pts.len());
    }

    #[test]
    fn test_crowding_distance_boundaries_infinite() {
        let pts = [scores(1.0, 1.0), scores(2.0, 2.0), scores(3.0, 3.0), scores(2.1, 2.1)];
        let refs: Vec<&ObjectiveScores> = pts.iter().collect();
        let front = vec![0, 1, 2, 3];
        let distance = crowding_distance(&front, &refs, &OBJECTIVES);

        assert!(distance[0].is_infinite());
        assert!(distance[2].is_infinite());
        assert!(distance[1].is_finite() && distance[3].is_finite());
        // 1번(2.0)은 0번과 3번 사이, 3번(2.1)은 1번과 2번 사이
        assert!(distance[3] > distance[1]);
    }
}
