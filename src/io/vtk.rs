//! Legacy VTK (`.vtk`) reader/writer for vortex lines.
//!
//! Lines are stored as an ASCII legacy `POLYDATA` dataset with one `LINES`
//! polyline per vortex; closed loops repeat their first point index. Frame
//! and line ids travel in `FIELD` data, per-point gauge values in
//! `POINT_DATA`.

use crate::algs::extractor::VortexLine;
use crate::track_error::TrackError;
use std::collections::HashMap;
use std::io::{Read, Write};

const FIELD_FRAME: &str = "vortex_track:frame";
const FIELD_LINE_IDS: &str = "vortex_track:line_ids";
const FIELD_GAUGE: &str = "vortex_track:gauge";

/// `vlines-{frame}.vtk`
pub fn line_file_name(frame: i32) -> String {
    format!("vlines-{frame}.vtk")
}

#[derive(Debug, Default, Clone)]
pub struct VtkLineWriter;

#[derive(Debug, Default, Clone)]
pub struct VtkLineReader;

fn parse_err(msg: impl Into<String>) -> TrackError {
    TrackError::Parse(msg.into())
}

impl VtkLineWriter {
    fn write_field_array<W: Write>(
        writer: &mut W,
        name: &str,
        num_tuples: usize,
        data_type: &str,
        values: &[String],
    ) -> Result<(), TrackError> {
        writeln!(writer, "{name} 1 {num_tuples} {data_type}")?;
        let mut line_len = 0usize;
        for value in values {
            if line_len + value.len() + 1 > 70 {
                writeln!(writer)?;
                line_len = 0;
            }
            if line_len > 0 {
                write!(writer, " ")?;
                line_len += 1;
            }
            write!(writer, "{value}")?;
            line_len += value.len();
        }
        writeln!(writer)?;
        Ok(())
    }

    /// Write all lines of one frame.
    pub fn write<W: Write>(&self, mut writer: W, frame: i32, lines: &[VortexLine]) -> Result<(), TrackError> {
        let n_points: usize = lines.iter().map(VortexLine::len).sum();
        let size: usize = lines
            .iter()
            .map(|l| 1 + l.len() + usize::from(l.is_loop && l.len() > 1))
            .sum();

        writeln!(writer, "# vtk DataFile Version 3.0")?;
        writeln!(writer, "vortex-track frame {frame}")?;
        writeln!(writer, "ASCII")?;
        writeln!(writer, "DATASET POLYDATA")?;
        writeln!(writer, "POINTS {n_points} float")?;
        for p in lines.iter().flat_map(|l| &l.points) {
            writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
        }

        writeln!(writer, "LINES {} {}", lines.len(), size)?;
        let mut offset = 0usize;
        for line in lines {
            let close = line.is_loop && line.len() > 1;
            write!(writer, "{}", line.len() + usize::from(close))?;
            for k in 0..line.len() {
                write!(writer, " {}", offset + k)?;
            }
            if close {
                write!(writer, " {offset}")?;
            }
            writeln!(writer)?;
            offset += line.len();
        }

        writeln!(writer, "FIELD FieldData 2")?;
        Self::write_field_array(&mut writer, FIELD_FRAME, 1, "int", &[frame.to_string()])?;
        let ids: Vec<String> = lines.iter().map(|l| l.id.to_string()).collect();
        Self::write_field_array(&mut writer, FIELD_LINE_IDS, ids.len(), "int", &ids)?;

        if n_points > 0 {
            writeln!(writer, "POINT_DATA {n_points}")?;
            writeln!(writer, "FIELD FieldData 1")?;
            let gauge: Vec<String> = lines
                .iter()
                .flat_map(|l| {
                    (0..l.len()).map(move |k| l.gauge.get(k).copied().unwrap_or(0.0).to_string())
                })
                .collect();
            Self::write_field_array(&mut writer, FIELD_GAUGE, n_points, "double", &gauge)?;
        }
        writer.flush()?;
        Ok(())
    }
}

struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn next_str(&mut self, what: &str) -> Result<&'a str, TrackError> {
        self.inner
            .next()
            .ok_or_else(|| parse_err(format!("missing {what}")))
    }

    fn next_parse<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, TrackError> {
        let tok = self.next_str(what)?;
        tok.parse()
            .map_err(|_| parse_err(format!("invalid {what} {tok}")))
    }

    fn expect(&mut self, keyword: &str) -> Result<(), TrackError> {
        match self.inner.next() {
            Some(t) if t == keyword => Ok(()),
            Some(t) => Err(parse_err(format!("expected {keyword}, found {t}"))),
            None => Err(parse_err(format!("expected {keyword}"))),
        }
    }

    fn field_arrays(&mut self, out: &mut HashMap<String, Vec<String>>) -> Result<(), TrackError> {
        let _name = self.next_str("field name")?;
        let n: usize = self.next_parse("field count")?;
        for _ in 0..n {
            let name = self.next_str("array name")?.to_string();
            let components: usize = self.next_parse("array components")?;
            let tuples: usize = self.next_parse("array tuples")?;
            let _ty = self.next_str("array type")?;
            let values = (0..components * tuples)
                .map(|_| self.next_str("array value").map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            out.insert(name, values);
        }
        Ok(())
    }
}

impl VtkLineReader {
    /// Read a file produced by [`VtkLineWriter`]. Crossed-face lists are not
    /// stored and come back empty.
    pub fn read<R: Read>(&self, mut reader: R) -> Result<(i32, Vec<VortexLine>), TrackError> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        let mut header = input.lines();
        let _version = header.next();
        let _comment = header.next();
        let format = header.next().ok_or_else(|| parse_err("missing ASCII line"))?;
        if format.trim() != "ASCII" {
            return Err(parse_err("VTK ASCII format required"));
        }
        let dataset = header.next().ok_or_else(|| parse_err("missing DATASET line"))?;
        if !dataset.trim().ends_with("POLYDATA") {
            return Err(parse_err("VTK POLYDATA required"));
        }
        let body: String = header.collect::<Vec<_>>().join("\n");
        let mut t = Tokens {
            inner: body.split_whitespace(),
        };

        t.expect("POINTS")?;
        let n_points: usize = t.next_parse("point count")?;
        let _ty = t.next_str("point type")?;
        let mut points = Vec::with_capacity(n_points);
        for _ in 0..n_points {
            points.push([
                t.next_parse::<f32>("coordinate")?,
                t.next_parse::<f32>("coordinate")?,
                t.next_parse::<f32>("coordinate")?,
            ]);
        }

        t.expect("LINES")?;
        let n_lines: usize = t.next_parse("line count")?;
        let _size: usize = t.next_parse("line list size")?;
        let mut conn = Vec::with_capacity(n_lines);
        for _ in 0..n_lines {
            let k: usize = t.next_parse("line length")?;
            let idx = (0..k)
                .map(|_| t.next_parse::<usize>("point index"))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(&bad) = idx.iter().find(|&&i| i >= n_points) {
                return Err(parse_err(format!("point index {bad} out of range")));
            }
            conn.push(idx);
        }

        let mut fields = HashMap::new();
        while let Some(tok) = t.inner.next() {
            match tok {
                "FIELD" => t.field_arrays(&mut fields)?,
                "POINT_DATA" => {
                    let _n: usize = t.next_parse("point data count")?;
                }
                other => return Err(parse_err(format!("unexpected token {other}"))),
            }
        }

        let frame = match fields.get(FIELD_FRAME).and_then(|v| v.first()) {
            Some(v) => v.parse().map_err(|_| parse_err(format!("invalid frame {v}")))?,
            None => 0,
        };
        let ids: Vec<usize> = match fields.get(FIELD_LINE_IDS) {
            Some(v) => v
                .iter()
                .map(|s| s.parse().map_err(|_| parse_err(format!("invalid line id {s}"))))
                .collect::<Result<_, _>>()?,
            None => (0..n_lines).collect(),
        };
        let gauge: Vec<f64> = match fields.get(FIELD_GAUGE) {
            Some(v) => v
                .iter()
                .map(|s| s.parse().map_err(|_| parse_err(format!("invalid gauge {s}"))))
                .collect::<Result<_, _>>()?,
            None => vec![0.0; n_points],
        };

        let lines = conn
            .into_iter()
            .enumerate()
            .map(|(k, mut idx)| {
                let is_loop = idx.len() > 2 && idx.first() == idx.last();
                if is_loop {
                    idx.pop();
                }
                VortexLine {
                    frame,
                    id: ids.get(k).copied().unwrap_or(k),
                    points: idx.iter().map(|&i| points[i]).collect(),
                    gauge: idx.iter().map(|&i| gauge.get(i).copied().unwrap_or(0.0)).collect(),
                    faces: Vec::new(),
                    is_loop,
                }
            })
            .collect();
        Ok((frame, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: usize, points: Vec<[f32; 3]>, is_loop: bool) -> VortexLine {
        let n = points.len();
        VortexLine {
            frame: 4,
            id,
            points,
            gauge: (0..n).map(|k| k as f64 * 0.5).collect(),
            faces: Vec::new(),
            is_loop,
        }
    }

    #[test]
    fn writes_polydata_lines() {
        let lines = vec![
            line(0, vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]], false),
            line(1, vec![[1.0, 0.0, 0.0], [1.5, 0.5, 0.0], [1.0, 1.0, 0.0]], true),
        ];
        let mut buf = Vec::new();
        VtkLineWriter.write(&mut buf, 4, &lines).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("DATASET POLYDATA"));
        assert!(text.contains("POINTS 5 float"));
        assert!(text.contains("LINES 2 8\n2 0 1\n4 2 3 4 2\n"));
        assert!(text.contains("POINT_DATA 5"));
    }

    #[test]
    fn reader_restores_order_grouping_and_loops() {
        let lines = vec![
            line(3, vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]], false),
            line(7, vec![[1.0, 0.0, 0.0], [1.5, 0.5, 0.0], [1.0, 1.0, 0.0]], true),
        ];
        let mut buf = Vec::new();
        VtkLineWriter.write(&mut buf, 4, &lines).unwrap();
        let (frame, back) = VtkLineReader.read(buf.as_slice()).unwrap();
        assert_eq!(frame, 4);
        assert_eq!(back, lines);
    }

    #[test]
    fn empty_frame_and_bad_input() {
        let mut buf = Vec::new();
        VtkLineWriter.write(&mut buf, 9, &[]).unwrap();
        let (frame, back) = VtkLineReader.read(buf.as_slice()).unwrap();
        assert_eq!(frame, 9);
        assert!(back.is_empty());

        let bad = "# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\n";
        assert!(matches!(
            VtkLineReader.read(bad.as_bytes()),
            Err(TrackError::Parse(_))
        ));
        assert_eq!(line_file_name(12), "vlines-12.vtk");
    }
}
