use crate::board::indices::*;
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerDef {
    pub name: String,
    pub index: u8,
}

/// A straight copper segment on one layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub net: NetId,
    pub layer: u8,
    pub start: Point<f64>,
    pub end: Point<f64>,
    pub width: f64,
}

impl Track {
    pub fn midpoint(&self) -> Point<f64> {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }
}

/// A plated hole connecting all layers at one position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Via {
    pub net: NetId,
    pub pos: Point<f64>,
    pub diameter: f64,
    pub drill: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PadShape {
    Circle,
    Rect,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pad {
    pub net: Option<NetId>,
    pub pos: Point<f64>,
    pub shape: PadShape,
    /// Width/height for Rect, diameter in `x` for Circle.
    pub size: Point<f64>,
    pub layers: Vec<u8>,
}

impl Pad {
    pub fn bounds(&self) -> Rect {
        match self.shape {
            PadShape::Circle => Rect::from_center(self.pos, self.size.x, self.size.x),
            PadShape::Rect => Rect::from_center(self.pos, self.size.x, self.size.y),
        }
    }

    /// Half of the larger extent, used as the obstacle expansion radius.
    pub fn half_extent(&self) -> f64 {
        match self.shape {
            PadShape::Circle => self.size.x / 2.0,
            PadShape::Rect => self.size.x.max(self.size.y) / 2.0,
        }
    }
}

/// Hard-exclusion region blocking every layer (e.g. under a BGA package).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Keepout {
    pub rect: Rect,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetDef {
    pub name: String,
}

/// The routing view of a PCB: layers, nets and all existing copper.
///
/// This is the interchange surface of the router. CAD-native formats are out of
/// scope; upstream tooling converts into and out of this model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoardModel {
    pub layers: Vec<LayerDef>,
    pub nets: Vec<NetDef>,
    pub tracks: Vec<Track>,
    pub vias: Vec<Via>,
    pub pads: Vec<Pad>,
    pub keepouts: Vec<Keepout>,

    #[serde(skip)]
    net_name_map: HashMap<String, NetId>,
}

impl BoardModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_layers(&self) -> u8 {
        self.layers.len() as u8
    }
    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    pub fn add_layer(&mut self, name: &str) -> u8 {
        let index = self.layers.len() as u8;
        self.layers.push(LayerDef {
            name: name.to_string(),
            index,
        });
        index
    }

    pub fn add_net(&mut self, name: &str) -> NetId {
        if let Some(&id) = self.net_name_map.get(name) {
            return id;
        }
        let id = NetId::new(self.nets.len());
        self.nets.push(NetDef {
            name: name.to_string(),
        });
        self.net_name_map.insert(name.to_string(), id);
        id
    }

    pub fn net_id(&self, name: &str) -> Option<NetId> {
        self.net_name_map.get(name).copied()
    }

    pub fn net_name(&self, id: NetId) -> &str {
        &self.nets[id.index()].name
    }

    /// Rebuild the name map after deserialization (serde skips it).
    pub fn reindex(&mut self) {
        self.net_name_map = self
            .nets
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), NetId::new(i)))
            .collect();
    }

    pub fn add_track(&mut self, net: NetId, layer: u8, start: Point<f64>, end: Point<f64>, width: f64) {
        self.tracks.push(Track {
            net,
            layer,
            start,
            end,
            width,
        });
    }

    pub fn add_via(&mut self, net: NetId, pos: Point<f64>, diameter: f64, drill: f64) {
        self.vias.push(Via {
            net,
            pos,
            diameter,
            drill,
        });
    }

    pub fn add_pad(
        &mut self,
        net: Option<NetId>,
        pos: Point<f64>,
        shape: PadShape,
        size: Point<f64>,
        layers: Vec<u8>,
    ) -> PadId {
        let id = PadId::new(self.pads.len());
        self.pads.push(Pad {
            net,
            pos,
            shape,
            size,
            layers,
        });
        id
    }

    pub fn add_keepout(&mut self, rect: Rect) {
        self.keepouts.push(Keepout { rect });
    }

    /// Bounding box over all geometry; None for an empty board.
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        let mut grow = |r: Rect| {
            bounds = Some(match bounds {
                None => r,
                Some(b) => Rect::new(
                    Point::new(b.min.x.min(r.min.x), b.min.y.min(r.min.y)),
                    Point::new(b.max.x.max(r.max.x), b.max.y.max(r.max.y)),
                ),
            });
        };
        for t in &self.tracks {
            let half = t.width / 2.0;
            grow(
                Rect::new(
                    Point::new(t.start.x.min(t.end.x), t.start.y.min(t.end.y)),
                    Point::new(t.start.x.max(t.end.x), t.start.y.max(t.end.y)),
                )
                .expand(half),
            );
        }
        for v in &self.vias {
            grow(Rect::from_center(v.pos, v.diameter, v.diameter));
        }
        for p in &self.pads {
            grow(p.bounds());
        }
        for k in &self.keepouts {
            grow(k.rect);
        }
        bounds
    }

    /// Nets forming differential pairs, detected by name suffix:
    /// `X_P`/`X_N` or `X+`/`X-` after a common prefix.
    pub fn diff_pairs(&self) -> Vec<(NetId, NetId)> {
        let mut pairs = Vec::new();
        for (i, net) in self.nets.iter().enumerate() {
            let Some(partner) = pair_partner_name(&net.name) else {
                continue;
            };
            // Only positive-side names produce a partner, so each pair
            // appears exactly once, as (P, N).
            if let Some(&other) = self.net_name_map.get(&partner) {
                pairs.push((NetId::new(i), other));
            }
        }
        pairs
    }
}

/// For a positive-polarity net name, the matching negative name.
fn pair_partner_name(name: &str) -> Option<String> {
    if let Some(prefix) = name.strip_suffix("_P") {
        return Some(format!("{prefix}_N"));
    }
    if let Some(prefix) = name.strip_suffix('+') {
        return Some(format!("{prefix}-"));
    }
    None
}
