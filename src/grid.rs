//! Grid of cells occupied by agents.

/// Resident of a grid cell.
///
/// Agent types run from 1 to the number of types. Income groups run from 1
/// to [`N_GROUPS`]; the simple model places every agent in group 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Agent {
    kind: usize,
    group: usize,
}

/// Number of ordinal income groups.
pub const N_GROUPS: usize = 5;

impl Agent {
    pub fn new(kind: usize, group: usize) -> Self {
        Self { kind, group }
    }

    /// Agent type.
    pub fn kind(&self) -> usize {
        self.kind
    }

    /// Income group.
    pub fn group(&self) -> usize {
        self.group
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Occupied(Agent),
}

impl Cell {
    pub fn agent(&self) -> Option<&Agent> {
        match self {
            Cell::Empty => None,
            Cell::Occupied(agt) => Some(agt),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

const MOORE_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

const VON_NEUMANN_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];

/// Square grid of cells stored in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Reshape a row-major vector of `size * size` cells into a grid.
    pub fn from_cells(size: usize, cells: Vec<Cell>) -> Option<Self> {
        (cells.len() == size * size).then_some(Self { size, cells })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.size + col]
    }

    pub fn n_agents(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    pub fn n_empty(&self) -> usize {
        self.cells.len() - self.n_agents()
    }

    /// Coordinates of every empty cell, in row-major order.
    pub fn empty_cells(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(idx, _)| (idx / self.size, idx % self.size))
            .collect()
    }

    /// Iterate over `(row, col, cell)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| (idx / self.size, idx % self.size, cell))
    }

    /// Agents in the 8-connected neighbourhood of a cell, clipped at the border.
    pub fn moore_neighbours(&self, row: usize, col: usize) -> impl Iterator<Item = &Agent> {
        self.neighbours(row, col, &MOORE_OFFSETS)
    }

    /// Agents in the 4-connected neighbourhood of a cell, clipped at the border.
    pub fn von_neumann_neighbours(&self, row: usize, col: usize) -> impl Iterator<Item = &Agent> {
        self.neighbours(row, col, &VON_NEUMANN_OFFSETS)
    }

    fn neighbours<'a>(
        &'a self,
        row: usize,
        col: usize,
        offsets: &'a [(isize, isize)],
    ) -> impl Iterator<Item = &'a Agent> {
        offsets.iter().filter_map(move |&(d_row, d_col)| {
            let n_row = row.checked_add_signed(d_row).filter(|&r| r < self.size)?;
            let n_col = col.checked_add_signed(d_col).filter(|&c| c < self.size)?;
            self.get(n_row, n_col).agent()
        })
    }

    /// Move the agent at `from` into the empty cell `to`, leaving `from` empty.
    pub fn relocate(&mut self, from: (usize, usize), to: (usize, usize)) {
        let from = from.0 * self.size + from.1;
        let to = to.0 * self.size + to.1;
        debug_assert!(self.cells[to].is_empty());
        self.cells[to] = std::mem::replace(&mut self.cells[from], Cell::Empty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agt(kind: usize) -> Cell {
        Cell::Occupied(Agent::new(kind, 1))
    }

    #[test]
    fn neighbourhoods_are_clipped_at_the_border() {
        let cells = vec![agt(1); 9];
        let grid = Grid::from_cells(3, cells).expect("valid shape");

        assert_eq!(grid.moore_neighbours(0, 0).count(), 3);
        assert_eq!(grid.moore_neighbours(0, 1).count(), 5);
        assert_eq!(grid.moore_neighbours(1, 1).count(), 8);
        assert_eq!(grid.von_neumann_neighbours(0, 0).count(), 2);
        assert_eq!(grid.von_neumann_neighbours(1, 1).count(), 4);
    }

    #[test]
    fn empty_neighbours_are_skipped() {
        let cells = vec![
            agt(1),
            Cell::Empty,
            agt(2),
            Cell::Empty,
            agt(1),
            Cell::Empty,
            agt(2),
            Cell::Empty,
            agt(1),
        ];
        let grid = Grid::from_cells(3, cells).expect("valid shape");

        assert_eq!(grid.moore_neighbours(1, 1).count(), 4);
        assert_eq!(grid.von_neumann_neighbours(1, 1).count(), 0);
        assert_eq!(grid.empty_cells(), vec![(0, 1), (1, 0), (1, 2), (2, 1)]);
        assert_eq!(grid.n_agents(), 5);
        assert_eq!(grid.n_empty(), 4);
    }

    #[test]
    fn relocate_moves_agent() {
        let cells = vec![agt(2), Cell::Empty, Cell::Empty, agt(1)];
        let mut grid = Grid::from_cells(2, cells).expect("valid shape");

        grid.relocate((0, 0), (1, 0));
        assert!(grid.get(0, 0).is_empty());
        assert_eq!(grid.get(1, 0).agent().map(Agent::kind), Some(2));
        assert_eq!(grid.n_agents(), 2);
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(Grid::from_cells(3, vec![Cell::Empty; 8]).is_none());
    }
}
