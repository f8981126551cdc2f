//! 유전 알고리즘 (NSGA-II 스타일).
//!
//! 한 세대 = 한 반복입니다.
//!
//! 1. 첫 세대: 기본값 개체 + 라틴 하이퍼큐브 샘플로 개체군 구성
//! 2. 이후 세대: 토너먼트 선택 → 균등 교차 → 가우시안 돌연변이로 자손 생성
//! 3. 부모 + 자손을 비지배 정렬과 혼잡도 거리로 순위화하여 개체군 크기로 절단
//!
//! 평가에 실패한 개체는 점수가 없어 항상 마지막 순위입니다.

use rand::{rngs::StdRng, Rng};
use rand_distr::{Distribution, Normal};
use tracing::debug;

use super::{Observation, SearchStrategy};
use crate::{
    block::ParameterSet,
    config::GeneticSettings,
    objective::{Objective, ObjectiveScores},
    pareto::{crowding_distance, non_dominated_sort},
    params::{ParameterDefinition, ParameterKind, ParameterSpace},
};

/// 개체 (유전체 + 평가 결과).
#[derive(Debug, Clone)]
struct Genome {
    parameters: ParameterSet,
    scores: Option<ObjectiveScores>,
}

/// 개체별 순위 정보.
#[derive(Debug, Clone, Copy)]
struct Fitness {
    rank: usize,
    crowding: f64,
}

impl Fitness {
    /// 낮은 순위, 같은 순위면 큰 혼잡도 거리가 우선.
    fn beats(&self, other: &Fitness) -> bool {
        self.rank < other.rank || (self.rank == other.rank && self.crowding > other.crowding)
    }
}

/// NSGA-II 스타일 다목적 유전 알고리즘.
#[derive(Debug)]
pub struct GeneticOptimizer {
    space: ParameterSpace,
    objectives: Vec<Objective>,
    settings: GeneticSettings,
    max_generations: usize,
    rng: StdRng,
    population: Vec<Genome>,
    fitness: Vec<Fitness>,
    /// 평가 대기 중인 자손
    offspring: Vec<ParameterSet>,
    generation: usize,
}

impl GeneticOptimizer {
    /// 새 최적화기 생성.
    pub fn new(
        space: ParameterSpace,
        objectives: Vec<Objective>,
        settings: GeneticSettings,
        max_generations: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            space,
            objectives,
            settings,
            max_generations,
            rng,
            population: Vec::new(),
            fitness: Vec::new(),
            offspring: Vec::new(),
            generation: 0,
        }
    }

    /// 현재 개체군 크기.
    pub fn population_len(&self) -> usize {
        self.population.len()
    }

    /// 첫 세대 유전체 (기본값 + 라틴 하이퍼큐브).
    fn initial_population(&mut self) -> Vec<ParameterSet> {
        let size = self.settings.population_size.max(2);
        let mut genomes = Vec::with_capacity(size);
        genomes.push(self.space.defaults());
        genomes.extend(self.space.latin_hypercube(size - 1, &mut self.rng));
        genomes
    }

    /// 자손 생성 (개체군 크기만큼).
    fn breed(&mut self) -> Vec<ParameterSet> {
        let size = self.settings.population_size.max(2);
        (0..size)
            .map(|_| {
                let a = self.tournament();
                let b = self.tournament();
                let child = self.crossover(a, b);
                self.mutate(child)
            })
            .collect()
    }

    /// 토너먼트 선택 (개체 인덱스).
    fn tournament(&mut self) -> usize {
        let len = self.population.len();
        let mut best = self.rng.gen_range(0..len);
        for _ in 1..self.settings.tournament_size.max(1) {
            let challenger = self.rng.gen_range(0..len);
            if self.fitness[challenger].beats(&self.fitness[best]) {
                best = challenger;
            }
        }
        best
    }

    /// 균등 교차: 파라미터마다 동전을 던져 부모를 선택.
    fn crossover(&mut self, a: usize, b: usize) -> ParameterSet {
        let mut child = ParameterSet::new();
        for d in self.space.definitions() {
            let parent = if self.rng.gen_bool(0.5) { a } else { b };
            let value = self.population[parent]
                .parameters
                .get(&d.block_id, &d.param_name)
                .unwrap_or(d.default_value);
            child.set(&d.block_id, &d.param_name, value);
        }
        child
    }

    /// 가우시안 돌연변이 (이산 파라미터는 이웃 선택지로 이동).
    fn mutate(&mut self, mut genome: ParameterSet) -> ParameterSet {
        let rate = self.settings.mutation_rate;
        let scale = self.settings.mutation_scale;

        for d in self.space.definitions() {
            if !self.rng.gen_bool(rate) {
                continue;
            }
            let current = genome.get(&d.block_id, &d.param_name).unwrap_or(d.default_value);
            let mutated = mutate_value(d, current, scale, &mut self.rng);
            genome.set(&d.block_id, &d.param_name, mutated);
        }

        self.space.clamp(&genome)
    }

    /// 순위 계산: 비지배 정렬 후 혼잡도 거리, 실패 개체는 마지막 계층.
    fn rank(&self, genomes: &[Genome]) -> Vec<Fitness> {
        let scored: Vec<usize> = (0..genomes.len()).filter(|&i| genomes[i].scores.is_some()).collect();
        let refs: Vec<&ObjectiveScores> = scored
            .iter()
            .filter_map(|&i| genomes[i].scores.as_ref())
            .collect();

        let mut fitness = vec![
            Fitness {
                rank: usize::MAX,
                crowding: 0.0,
            };
            genomes.len()
        ];

        let fronts = non_dominated_sort(&refs, &self.objectives);
        let failed_rank = fronts.len();
        for (rank, front) in fronts.iter().enumerate() {
            let distance = crowding_distance(front, &refs, &self.objectives);
            for (&local, crowding) in front.iter().zip(distance) {
                fitness[scored[local]] = Fitness { rank, crowding };
            }
        }
        for f in fitness.iter_mut().filter(|f| f.rank == usize::MAX) {
            f.rank = failed_rank;
        }
        fitness
    }

    /// 순위 순으로 `size`개 생존자 선택.
    fn truncate(&self, genomes: Vec<Genome>, size: usize) -> (Vec<Genome>, Vec<Fitness>) {
        let fitness = self.rank(&genomes);
        let mut order: Vec<usize> = (0..genomes.len()).collect();
        order.sort_by(|&a, &b| {
            fitness[a].rank.cmp(&fitness[b].rank).then_with(|| {
                fitness[b]
                    .crowding
                    .partial_cmp(&fitness[a].crowding)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        order.truncate(size);

        let mut slots: Vec<Option<Genome>> = genomes.into_iter().map(Some).collect();
        let survivors: Vec<Genome> = order.iter().filter_map(|&i| slots[i].take()).collect();
        // 생존자 집합 안에서 다시 순위화
        let survivor_fitness = self.rank(&survivors);
        (survivors, survivor_fitness)
    }
}

fn mutate_value(d: &ParameterDefinition, current: f64, scale: f64, rng: &mut StdRng) -> f64 {
    match &d.kind {
        ParameterKind::Discrete { values } => {
            let idx = values
                .iter()
                .position(|v| *v == d.clamp(current))
                .unwrap_or(0);
            let next = if idx == 0 {
                1
            } else if idx + 1 >= values.len() || rng.gen_bool(0.5) {
                idx - 1
            } else {
                idx + 1
            };
            values.get(next).copied().unwrap_or(current)
        }
        _ => {
            let sigma = scale * d.range();
            match Normal::new(0.0, sigma) {
                Ok(normal) if sigma > 0.0 => d.clamp(current + normal.sample(rng)),
                _ => current,
            }
        }
    }
}

impl SearchStrategy for GeneticOptimizer {
    fn name(&self) -> &'static str {
        "genetic"
    }

    fn next_batch(&mut self) -> Vec<ParameterSet> {
        if self.generation >= self.max_generations || !self.offspring.is_empty() {
            return Vec::new();
        }

        let batch = if self.population.is_empty() {
            self.initial_population()
        } else {
            self.breed()
        };
        self.offspring = batch.clone();
        batch
    }

    fn observe(&mut self, observations: &[Observation]) {
        if self.offspring.is_empty() {
            return;
        }

        let offspring = std::mem::take(&mut self.offspring);
        let children: Vec<Genome> = offspring
            .into_iter()
            .enumerate()
            .map(|(i, parameters)| Genome {
                scores: observations.get(i).and_then(|o| o.scores.clone()),
                parameters,
            })
            .collect();

        let size = self.settings.population_size.max(2);
        let mut pool = std::mem::take(&mut self.population);
        pool.extend(children);

        let (survivors, fitness) = self.truncate(pool, size);
        self.population = survivors;
        self.fitness = fitness;
        self.generation += 1;

        debug!(
            generation = self.generation,
            population = self.population.len(),
            front = self.fitness.iter().filter(|f| f.rank == 0).count(),
            "세대 완료"
        );
    }

    fn is_finished(&self) -> bool {
        self.generation >= self.max_generations
    }

    fn iterations_completed(&self) -> usize {
        self.generation
    }

    fn max_iterations(&self) -> usize {
        self.max_generations
    }
}
