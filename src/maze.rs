//! Bindings for the maze solver module
//!
//! Typed host structs, their descriptors and a `Solver` wrapper around the
//! module's `solve(Board, Coordinates, i32) -> Move` export.
//!
//! Layouts (tightly packed):
//! - `Coordinates { x: i16, y: i16 }` - 4 bytes
//! - `Tile { doors: u8, treasure: i8 }` - 2 bytes, `treasure = -1` when empty
//! - `Board { tiles: *Tile, width: i16, height: i16, spare: Tile }` - 10 bytes
//! - `Move { insert: Coordinates, rotation: u8, target: Coordinates }` - 9 bytes

use crate::error::{BridgeError, Result};
use crate::interop::{Bridge, NativeModule, Primitive, TypeDescriptor, TypeRegistry, TypeTag, Value};

/// Export called by `Solver::solve`
pub const SOLVE_EXPORT: &str = "solve";

/// Treasure id of a tile without treasure
pub const NO_TREASURE: i8 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Door {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Door {
    pub const ALL: [Door; 4] = [Door::North, Door::East, Door::South, Door::West];

    /// Mask bit for this door, `1 << door`
    ///
    /// Must agree with the bit order the solver module decodes; the module
    /// this was written against computed `1 >> door`, which cannot encode
    /// any door but North, so confirm against the module you load.
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Doors set in `mask`, in bit order; bits above 3 are ignored
    pub fn from_mask(mask: u8) -> Vec<Door> {
        Self::ALL.into_iter().filter(|door| mask & door.bit() != 0).collect()
    }
}

/// Bitmask with bit `door` set for each open door
pub fn door_mask(doors: &[Door]) -> u8 {
    doors.iter().fold(0, |mask, door| mask | door.bit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinates {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub doors: u8,
    pub treasure: i8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Row-major, `width * height` entries
    pub tiles: Vec<Tile>,
    pub width: i16,
    pub height: i16,
    pub spare: Tile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub insert: Coordinates,
    pub rotation: u8,
    pub target: Coordinates,
}

impl Coordinates {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    pub fn to_value(self) -> Value {
        Value::object([("x", Value::Int(self.x.into())), ("y", Value::Int(self.y.into()))])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            x: field(value, "Coordinates", "x")?,
            y: field(value, "Coordinates", "y")?,
        })
    }
}

impl Tile {
    pub fn new(doors: &[Door], treasure: Option<i8>) -> Self {
        Self {
            doors: door_mask(doors),
            treasure: treasure.unwrap_or(NO_TREASURE),
        }
    }

    pub fn doors(&self) -> Vec<Door> {
        Door::from_mask(self.doors)
    }

    pub fn treasure(&self) -> Option<i8> {
        (self.treasure != NO_TREASURE).then_some(self.treasure)
    }

    pub fn to_value(self) -> Value {
        Value::object([
            ("doors", Value::Int(self.doors.into())),
            ("treasure", Value::Int(self.treasure.into())),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            doors: field(value, "Tile", "doors")?,
            treasure: field(value, "Tile", "treasure")?,
        })
    }
}

impl Board {
    pub fn to_value(&self) -> Value {
        Value::object([
            ("tiles", Value::List(self.tiles.iter().map(|t| t.to_value()).collect())),
            ("width", Value::Int(self.width.into())),
            ("height", Value::Int(self.height.into())),
            ("spare", self.spare.to_value()),
        ])
    }

    pub fn tile(&self, at: Coordinates) -> Option<&Tile> {
        if at.x < 0 || at.y < 0 || at.x >= self.width || at.y >= self.height {
            return None;
        }
        self.tiles.get(at.y as usize * self.width as usize + at.x as usize)
    }
}

impl Move {
    pub fn from_value(value: &Value) -> Result<Self> {
        let nested = |name: &'static str| {
            value.get(name).ok_or_else(|| missing("Move", name, value))
        };
        Ok(Self {
            insert: Coordinates::from_value(nested("insert")?)?,
            rotation: field(value, "Move", "rotation")?,
            target: Coordinates::from_value(nested("target")?)?,
        })
    }
}

fn field<T: TryFrom<i64>>(value: &Value, owner: &str, name: &'static str) -> Result<T> {
    let raw = value
        .get(name)
        .and_then(Value::as_int)
        .ok_or_else(|| missing(owner, name, value))?;
    T::try_from(raw).map_err(|_| BridgeError::ValueOutOfRange {
        value: raw.to_string(),
        tag: format!("{}.{}", owner, name),
    })
}

fn missing(owner: &str, name: &str, value: &Value) -> BridgeError {
    BridgeError::ValueShape {
        tag: format!("{}.{}", owner, name),
        expected: "integer field",
        found: value.kind().to_string(),
    }
}

/// Register `Coordinates`, `Tile`, `Board` and `Move`
pub fn register_descriptors(registry: &mut TypeRegistry) -> Result<()> {
    let coordinates = || TypeTag::structure("Coordinates");
    let tile = || TypeTag::structure("Tile");

    registry.register(
        "Coordinates",
        TypeDescriptor::record([("x", TypeTag::from(Primitive::I16)), ("y", Primitive::I16.into())]),
    )?;
    registry.register(
        "Tile",
        TypeDescriptor::record([("doors", TypeTag::from(Primitive::U8)), ("treasure", Primitive::I8.into())]),
    )?;
    registry.register(
        "Board",
        TypeDescriptor::record([
            ("tiles", TypeTag::pointer(tile())),
            ("width", Primitive::I16.into()),
            ("height", Primitive::I16.into()),
            ("spare", tile()),
        ]),
    )?;
    registry.register(
        "Move",
        TypeDescriptor::record([
            ("insert", coordinates()),
            ("rotation", Primitive::U8.into()),
            ("target", coordinates()),
        ]),
    )?;
    registry.validate()
}

/// Typed front end for the solver export
pub struct Solver<M: NativeModule> {
    bridge: Bridge<M>,
    return_tag: TypeTag,
    arg_tags: [TypeTag; 3],
}

impl<M: NativeModule> Solver<M> {
    pub fn new(module: M) -> Result<Self> {
        let mut registry = TypeRegistry::new();
        register_descriptors(&mut registry)?;
        Ok(Self::with_bridge(Bridge::with_registry(module, registry)))
    }

    /// Wrap a bridge that already has the maze descriptors registered
    pub fn with_bridge(bridge: Bridge<M>) -> Self {
        Self {
            bridge,
            return_tag: TypeTag::structure("Move"),
            arg_tags: [
                TypeTag::structure("Board"),
                TypeTag::structure("Coordinates"),
                Primitive::I32.into(),
            ],
        }
    }

    /// Ask the module for the best move towards `treasure`
    pub fn solve(&mut self, board: &Board, player: Coordinates, treasure: i32) -> Result<Move> {
        let expected = usize::try_from(board.width)
            .ok()
            .zip(usize::try_from(board.height).ok())
            .and_then(|(w, h)| w.checked_mul(h));
        if expected != Some(board.tiles.len()) {
            return Err(BridgeError::ValueShape {
                tag: "Board.tiles".to_string(),
                expected: "width * height tiles, non-negative dimensions",
                found: format!(
                    "{} tiles on a {}x{} board",
                    board.tiles.len(),
                    board.width,
                    board.height
                ),
            });
        }

        let args = [board.to_value(), player.to_value(), Value::Int(treasure.into())];
        let value = self
            .bridge
            .invoke(SOLVE_EXPORT, &self.return_tag, &self.arg_tags, &args)?;
        Move::from_value(&value)
    }

    pub fn bridge(&self) -> &Bridge<M> {
        &self.bridge
    }

    pub fn into_bridge(self) -> Bridge<M> {
        self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::{layout, memory, HostInstance, HostModule, NativeValue, Scalar};

    #[test]
    fn door_bits_follow_door_order() {
        assert_eq!(Door::North.bit(), 0b0001);
        assert_eq!(Door::East.bit(), 0b0010);
        assert_eq!(Door::South.bit(), 0b0100);
        assert_eq!(Door::West.bit(), 0b1000);
        assert_eq!(door_mask(&[Door::North, Door::South]), 0b0101);
        assert_eq!(door_mask(&[]), 0);
    }

    #[test]
    fn masks_decode_back_to_doors() {
        assert_eq!(Door::from_mask(0b1010), vec![Door::East, Door::West]);
        assert_eq!(Door::from_mask(0xF0), Vec::<Door>::new());
        let tile = Tile::new(&[Door::West, Door::North], Some(3));
        assert_eq!(tile.doors(), vec![Door::North, Door::West]);
        assert_eq!(tile.treasure(), Some(3));
        assert_eq!(Tile::new(&[], None).treasure(), None);
    }

    #[test]
    fn layouts_are_tightly_packed() {
        let mut registry = TypeRegistry::new();
        register_descriptors(&mut registry).unwrap();
        let size = |name: &str| layout::size_of(&registry, &TypeTag::structure(name)).unwrap();

        assert_eq!(size("Coordinates"), 4);
        assert_eq!(size("Tile"), 2);
        assert_eq!(size("Board"), 10);
        assert_eq!(size("Move"), 9);
        assert_eq!(layout::field_offsets(&registry, "Move").unwrap(), vec![0, 4, 5]);
    }

    #[test]
    fn board_lookup_is_row_major() {
        let board = Board {
            tiles: (0..6).map(|i| Tile { doors: 0, treasure: i }).collect(),
            width: 3,
            height: 2,
            spare: Tile::new(&[], None),
        };
        assert_eq!(board.tile(Coordinates::new(1, 1)).map(|t| t.treasure), Some(4));
        assert!(board.tile(Coordinates::new(3, 0)).is_none());
        assert!(board.tile(Coordinates::new(0, -1)).is_none());
    }

    /// Walks the board in memory and targets the tile holding the treasure
    fn fake_solve(instance: &mut HostInstance, params: &[NativeValue]) -> Result<Option<NativeValue>> {
        let address = |i: usize| params[i].as_address().unwrap_or(0);
        let int = |s: Scalar| match s {
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        };
        let (ret, board, player) = (address(0), address(1), address(2));
        let wanted = match params[3] {
            NativeValue::I32(v) => i64::from(v),
            _ => return Err(BridgeError::native("solve", "treasure must be i32")),
        };

        let mem = instance.memory();
        let tiles = memory::read_address(mem, board)?;
        let width = int(memory::read_primitive(mem, board + 4, Primitive::I16)?);
        let height = int(memory::read_primitive(mem, board + 6, Primitive::I16)?);
        let spare_doors = int(memory::read_primitive(mem, board + 8, Primitive::U8)?);
        let player_x = int(memory::read_primitive(mem, player, Primitive::I16)?);
        let player_y = int(memory::read_primitive(mem, player + 2, Primitive::I16)?);

        let mut target = (player_x, player_y);
        for index in 0..width * height {
            let treasure = int(memory::read_primitive(mem, tiles + index as u32 * 2 + 1, Primitive::I8)?);
            if treasure == wanted {
                target = (index % width, index / width);
            }
        }

        let mem = instance.memory_mut();
        memory::write_primitive(mem, ret, Scalar::Int(0), Primitive::I16)?;
        memory::write_primitive(mem, ret + 2, Scalar::Int(1), Primitive::I16)?;
        memory::write_primitive(mem, ret + 4, Scalar::Int(spare_doors), Primitive::U8)?;
        memory::write_primitive(mem, ret + 5, Scalar::Int(target.0), Primitive::I16)?;
        memory::write_primitive(mem, ret + 7, Scalar::Int(target.1), Primitive::I16)?;
        Ok(None)
    }

    fn board() -> Board {
        let mut tiles = vec![Tile::new(&[Door::North, Door::South], None); 9];
        tiles[5].treasure = 7;
        Board {
            tiles,
            width: 3,
            height: 3,
            spare: Tile::new(&[Door::East, Door::West], None),
        }
    }

    #[test]
    fn solver_round_trips_through_the_module() {
        let mut module = HostModule::new();
        module.export(SOLVE_EXPORT, fake_solve);
        let mut solver = Solver::new(module).unwrap();

        let mv = solver.solve(&board(), Coordinates::new(0, 0), 7).unwrap();
        assert_eq!(
            mv,
            Move {
                insert: Coordinates::new(0, 1),
                rotation: 0b1010,
                target: Coordinates::new(2, 1),
            }
        );

        let bridge = solver.into_bridge();
        assert_eq!(bridge.module().live_allocations(), 0);
        // return buffer, board, tile array, player
        assert_eq!(bridge.stats().allocations, 4);
        assert_eq!(bridge.stats().releases, 4);
    }

    #[test]
    fn inconsistent_board_is_rejected_before_calling() {
        let mut module = HostModule::new();
        module.export(SOLVE_EXPORT, fake_solve);
        let mut solver = Solver::new(module).unwrap();

        let mut bad = board();
        bad.tiles.pop();
        assert!(solver.solve(&bad, Coordinates::new(0, 0), 7).is_err());
        assert!(solver.bridge().module().calls().is_empty());
    }

    #[test]
    fn negative_dimensions_are_rejected_before_calling() {
        let mut module = HostModule::new();
        module.export(SOLVE_EXPORT, fake_solve);
        let mut solver = Solver::new(module).unwrap();

        for (width, height, tiles) in [(-1, -1, 1), (-1, -1, 0), (-3, 2, 6), (i16::MIN, i16::MIN, 0)] {
            let bad = Board {
                tiles: vec![Tile::new(&[], None); tiles],
                width,
                height,
                ..board()
            };
            let err = solver.solve(&bad, Coordinates::new(0, 0), 7).unwrap_err();
            assert!(matches!(err, BridgeError::ValueShape { .. }), "{}x{}", width, height);
        }
        assert!(solver.bridge().module().calls().is_empty());
        assert_eq!(solver.bridge().stats().allocations, 0);
    }
}
